//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping internal errors to appropriate HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use medtutor_chat::ChatError;
use medtutor_core::error::MedtutorError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    /// Upstream response body, for provider failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 409 Conflict - the conversation was closed mid-request.
    Conflict(String),
    /// 413 Payload Too Large - upload over the size limit.
    PayloadTooLarge(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// Provider returned a non-success status; relayed as is.
    Upstream { status: u16, details: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg, None)
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg, None)
            }
            ApiError::Upstream { status, details } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                "upstream_error",
                format!("Provider returned {}", status),
                Some(details),
            ),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<MedtutorError> for ApiError {
    fn from(err: MedtutorError) -> Self {
        match &err {
            MedtutorError::Config(msg) => ApiError::BadRequest(msg.clone()),
            MedtutorError::PayloadTooLarge { limit, .. } => ApiError::PayloadTooLarge(format!(
                "Arquivo excede o limite de {}MB.",
                limit / (1024 * 1024)
            )),
            MedtutorError::UnsupportedMediaType(mime) => ApiError::BadRequest(format!(
                "Tipo de arquivo não suportado: {}. Use: JPG, PNG, WebP, GIF, BMP ou TIFF.",
                mime
            )),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage | ChatError::TooManyImages(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ChatError::Upstream { status, body } => ApiError::Upstream {
                status,
                details: body,
            },
            ChatError::Superseded => ApiError::Conflict(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
