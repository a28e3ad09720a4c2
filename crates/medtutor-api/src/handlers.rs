//! Route handler functions for all API endpoints.
//!
//! Each handler extracts its inputs via axum extractors, interacts with
//! AppState services, and returns JSON (or a passthrough byte stream).

use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use medtutor_chat::transport::HttpTransport;
use medtutor_chat::{Category, ChatTransport, NullSink, RenderedResponse};
use medtutor_core::config::MedtutorConfig;
use medtutor_core::types::{
    new_conversation_id, ChatRequest, ChatTurn, ConversationSummary, ImageAttachment, Role,
    StoredConversation,
};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_PROXY_MAX_TOKENS: u32 = 2048;
const DEFAULT_PROXY_TEMPERATURE: f32 = 0.3;
const DEFAULT_LIST_LIMIT: usize = 50;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatProxyRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(rename = "max_tokens")]
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub stream: Option<bool>,
    /// Overrides the configured endpoint for this call.
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub endpoint_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsResponse {
    pub max_file_size: usize,
    #[serde(rename = "maxFileSizeMB")]
    pub max_file_size_mb: f64,
    pub allowed_types: Vec<String>,
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub endpoint_url: Option<String>,
    /// The key itself is never returned.
    pub api_key_configured: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub conversation_id: String,
    pub category: Category,
    pub response: RenderedResponse,
    pub is_error: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

fn config_snapshot(state: &AppState) -> Result<MedtutorConfig, ApiError> {
    state
        .config
        .lock()
        .map(|c| c.clone())
        .map_err(|e| ApiError::Internal(format!("Config lock poisoned: {}", e)))
}

// =============================================================================
// Model proxy
// =============================================================================

/// POST /api/chat - forward a chat-completions request to the provider.
///
/// Streaming responses are passed through byte for byte as an event
/// stream. Complete responses are unwrapped into the chat-completions
/// shape.
pub async fn chat_proxy(
    State(state): State<AppState>,
    Json(body): Json<ChatProxyRequest>,
) -> Result<Response, ApiError> {
    let config = config_snapshot(&state)?;

    let endpoint = body
        .endpoint_url
        .as_deref()
        .or(config.provider.endpoint_url.as_deref())
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            ApiError::Internal(
                "Provider endpoint URL is not configured. Set it in the settings or in MEDTUTOR_ENDPOINT_URL."
                    .to_string(),
            )
        })?;

    let mut messages = body.messages;
    if !messages.iter().any(|t| t.role == Role::System) {
        messages.insert(0, ChatTurn::system(config.chat.system_prompt.as_str()));
    }
    let request = ChatRequest {
        messages,
        max_tokens: body.max_tokens.unwrap_or(DEFAULT_PROXY_MAX_TOKENS),
        temperature: body.temperature.unwrap_or(DEFAULT_PROXY_TEMPERATURE),
        stream: body.stream.unwrap_or(false),
    };

    let transport = HttpTransport::with_client(
        state.client.clone(),
        endpoint,
        config.provider.api_key.clone(),
    )
    .with_timeout(std::time::Duration::from_secs(config.provider.timeout_secs));

    info!(
        url = %transport.url(),
        stream = request.stream,
        turns = request.messages.len(),
        "Proxying chat request"
    );

    if request.stream {
        let bytes = transport.stream(&request).await?;
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(bytes))
            .map_err(|e| ApiError::Internal(format!("Failed to build response: {}", e)));
    }

    let body: Value = transport.complete_body(&request).await?;
    Ok(Json(body).into_response())
}

// =============================================================================
// Uploads
// =============================================================================

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(format!("Erro no upload: {}", err.body_text()))
    } else {
        ApiError::BadRequest(format!("Erro no upload: {}", err.body_text()))
    }
}

/// POST /api/upload - accept one image in the `image` field and return it
/// base64-encoded.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImageAttachment>, ApiError> {
    let limits = config_snapshot(&state)?.upload;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("image") {
            continue;
        }
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let original_name = field.file_name().unwrap_or_default().to_string();
        limits.check_type(&mime_type)?;

        let bytes = field.bytes().await.map_err(multipart_error)?;
        limits.check_size(bytes.len())?;

        info!(
            mime = %mime_type,
            size = bytes.len(),
            "Image uploaded"
        );
        return Ok(Json(ImageAttachment::new(
            STANDARD.encode(&bytes),
            &mime_type,
            &original_name,
            bytes.len(),
        )));
    }

    Err(ApiError::BadRequest("Nenhuma imagem enviada.".to_string()))
}

/// GET /api/limits - upload limits for the client.
pub async fn limits(State(state): State<AppState>) -> Result<Json<LimitsResponse>, ApiError> {
    let upload = config_snapshot(&state)?.upload;
    Ok(Json(LimitsResponse {
        max_file_size: upload.max_file_size,
        max_file_size_mb: upload.max_file_size_mb(),
        allowed_extensions: upload.allowed_extensions(),
        allowed_types: upload.allowed_types,
    }))
}

// =============================================================================
// Settings
// =============================================================================

/// GET /api/settings - current provider settings.
pub async fn get_settings(
    State(state): State<AppState>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let provider = config_snapshot(&state)?.provider;
    Ok(Json(SettingsResponse {
        endpoint_url: provider.endpoint_url,
        api_key_configured: provider.api_key.is_some(),
    }))
}

/// POST /api/settings - update provider settings and persist them.
///
/// An empty string clears a value; an absent field leaves it unchanged.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<StatusResponse>, ApiError> {
    let updated = {
        let mut config = state
            .config
            .lock()
            .map_err(|e| ApiError::Internal(format!("Config lock poisoned: {}", e)))?;
        let clean = |v: String| Some(v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(url) = update.endpoint_url {
            config.provider.endpoint_url = clean(url);
        }
        if let Some(key) = update.api_key {
            config.provider.api_key = clean(key);
        }
        config.clone()
    };

    state.refresh_transport(&updated.provider);

    // Persist to disk.
    if let Err(e) = updated.save(&state.config_path) {
        warn!(error = %e, path = %state.config_path.display(), "Failed to save config to disk");
    }

    info!(
        endpoint_configured = updated.provider.endpoint_url.is_some(),
        "Provider settings updated"
    );
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        message: "Settings updated".to_string(),
    }))
}

// =============================================================================
// Server-side pipeline
// =============================================================================

/// POST /api/ask - classify, send and render one message server-side.
pub async fn ask(
    State(state): State<AppState>,
    Json(body): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let conversation_id = body
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(new_conversation_id);

    let outcome = state
        .orchestrator
        .send(&conversation_id, &body.message, &body.images, &mut NullSink)
        .await?;

    Ok(Json(AskResponse {
        conversation_id,
        category: outcome.category,
        response: outcome.rendered,
        is_error: outcome.is_error,
    }))
}

// =============================================================================
// Conversation history
// =============================================================================

/// GET /api/conversations - most recently updated conversations.
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let conversations = state.store.list_recent(limit)?;
    Ok(Json(ConversationsResponse { conversations }))
}

/// GET /api/conversations/{id} - one stored conversation.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredConversation>, ApiError> {
    let mut conversation = state
        .store
        .load(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Conversation not found: {}", id)))?;
    conversation.turns.retain(|t| t.role != Role::System);
    Ok(Json(conversation))
}

/// DELETE /api/conversations/{id}
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if state.orchestrator.delete(&id).await? {
        Ok(Json(DeletedResponse { deleted: 1 }))
    } else {
        Err(ApiError::NotFound(format!("Conversation not found: {}", id)))
    }
}

/// DELETE /api/conversations - remove every conversation.
pub async fn clear_conversations(
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = state.orchestrator.clear_all().await?;
    info!(deleted, "Conversation history cleared");
    Ok(Json(DeletedResponse { deleted }))
}
