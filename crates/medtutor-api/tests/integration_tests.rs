//! Integration tests for the MedTutor API.
//!
//! Each test builds its own state over an in-memory database. Provider
//! calls go to a wiremock server.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use medtutor_api::create_router;
use medtutor_api::handlers::{ConversationsResponse, LimitsResponse, SettingsResponse};
use medtutor_api::state::AppState;
use medtutor_core::config::MedtutorConfig;
use medtutor_storage::{Database, SqliteConversationStore};

// =============================================================================
// Helpers
// =============================================================================

const BOUNDARY: &str = "medtutor-test-boundary";

struct TestApp {
    state: AppState,
    // Keeps the config directory alive for the duration of the test.
    _dir: tempfile::TempDir,
}

impl TestApp {
    fn new(endpoint: Option<String>) -> Self {
        Self::with_config(endpoint, |_| {})
    }

    fn with_config(endpoint: Option<String>, tweak: impl FnOnce(&mut MedtutorConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MedtutorConfig::default();
        config.provider.endpoint_url = endpoint;
        tweak(&mut config);
        let store = Arc::new(SqliteConversationStore::new(Arc::new(
            Database::in_memory().unwrap(),
        )));
        let state = AppState::new(config, dir.path().join("config.toml"), store).unwrap();
        Self { state, _dir: dir }
    }

    fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }
}

fn endpoint(server: &MockServer) -> Option<String> {
    Some(format!("{}/v1/endpoints/e1", server.uri()))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::delete(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn multipart(field: &str, file_name: &str, mime: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"{n}\"\r\nContent-Type: {m}\r\n\r\n",
            b = BOUNDARY,
            f = field,
            n = file_name,
            m = mime
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::post("/api/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Read full response body bytes.
async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

fn sse(deltas: &[&str]) -> String {
    let mut body = String::new();
    for d in deltas {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"content": d}}]})
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

// =============================================================================
// Limits and uploads
// =============================================================================

#[tokio::test]
async fn test_limits() {
    let app = TestApp::new(None);
    let resp = app.router().oneshot(get("/api/limits")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body_bytes(resp).await;
    let raw: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(raw["maxFileSizeMB"], 30.0);

    let limits: LimitsResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(limits.max_file_size, 30 * 1024 * 1024);
    assert_eq!(limits.allowed_types.len(), 6);
    assert!(limits.allowed_extensions.contains(&".jpeg".to_string()));
}

#[tokio::test]
async fn test_upload_returns_base64() {
    let app = TestApp::new(None);
    let resp = app
        .router()
        .oneshot(multipart("image", "rx.png", "image/png", b"abc"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["base64"], "YWJj");
    assert_eq!(json["mimeType"], "image/png");
    assert_eq!(json["dataUrl"], "data:image/png;base64,YWJj");
    assert_eq!(json["originalName"], "rx.png");
    assert_eq!(json["size"], 3);
}

#[tokio::test]
async fn test_upload_rejects_unsupported_type() {
    let app = TestApp::new(None);
    let resp = app
        .router()
        .oneshot(multipart("image", "laudo.pdf", "application/pdf", b"%PDF"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert!(json["message"].as_str().unwrap().contains("application/pdf"));
}

#[tokio::test]
async fn test_upload_rejects_oversized_file() {
    let app = TestApp::with_config(None, |c| c.upload.max_file_size = 8);
    let resp = app
        .router()
        .oneshot(multipart("image", "big.png", "image/png", &[0u8; 64]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_upload_without_image_field() {
    let app = TestApp::new(None);
    let resp = app
        .router()
        .oneshot(multipart("file", "rx.png", "image/png", b"abc"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["message"], "Nenhuma imagem enviada.");
}

// =============================================================================
// Chat proxy
// =============================================================================

#[tokio::test]
async fn test_chat_proxy_without_endpoint() {
    let app = TestApp::new(None);
    let resp = app
        .router()
        .oneshot(post_json(
            "/api/chat",
            json!({"messages": [{"role": "user", "content": "olá"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_chat_proxy_complete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "predictions": [{"text": "Olá, colega."}]
        })))
        .mount(&server)
        .await;

    let app = TestApp::new(endpoint(&server));
    let resp = app
        .router()
        .oneshot(post_json(
            "/api/chat",
            json!({"messages": [{"role": "user", "content": "olá"}], "max_tokens": 32}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["choices"][0]["message"]["content"], "Olá, colega.");
    assert_eq!(json["choices"][0]["message"]["role"], "assistant");

    let received = server.received_requests().await.unwrap();
    assert!(received[0].url.path().ends_with(":predict"));
    let sent: Value = serde_json::from_slice(&received[0].body).unwrap();
    let instance = &sent["instances"][0];
    assert_eq!(instance["max_tokens"], 32);
    assert_eq!(instance["messages"][0]["role"], "system");
    assert_eq!(instance["messages"][1]["content"], "olá");
}

#[tokio::test]
async fn test_chat_proxy_streams_passthrough() {
    let server = MockServer::start().await;
    let body = sse(&["Sep", "se"]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.clone(), "text/event-stream"))
        .mount(&server)
        .await;

    let app = TestApp::new(None);
    let resp = app
        .router()
        .oneshot(post_json(
            "/api/chat",
            json!({
                "messages": [{"role": "user", "content": "sepse"}],
                "stream": true,
                "endpointUrl": endpoint(&server),
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(String::from_utf8(body_bytes(resp).await).unwrap(), body);
}

#[tokio::test]
async fn test_chat_proxy_relays_upstream_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model overloaded"))
        .mount(&server)
        .await;

    let app = TestApp::new(endpoint(&server));
    let resp = app
        .router()
        .oneshot(post_json(
            "/api/chat",
            json!({"messages": [{"role": "user", "content": "olá"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "upstream_error");
    assert_eq!(json["details"], "model overloaded");
}

// =============================================================================
// Settings
// =============================================================================

#[tokio::test]
async fn test_settings_update_is_persisted() {
    let app = TestApp::new(None);

    let resp = app
        .router()
        .oneshot(post_json(
            "/api/settings",
            json!({"endpointUrl": " https://example.test/e1 ", "apiKey": "segredo"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.router().oneshot(get("/api/settings")).await.unwrap();
    let settings: SettingsResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(settings.endpoint_url.as_deref(), Some("https://example.test/e1"));
    assert!(settings.api_key_configured);

    let saved = MedtutorConfig::load(&app.state.config_path).unwrap();
    assert_eq!(saved.provider.api_key.as_deref(), Some("segredo"));

    // An empty string clears the key.
    app.router()
        .oneshot(post_json("/api/settings", json!({"apiKey": ""})))
        .await
        .unwrap();
    let resp = app.router().oneshot(get("/api/settings")).await.unwrap();
    let settings: SettingsResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(!settings.api_key_configured);
    assert!(settings.endpoint_url.is_some());
}

// =============================================================================
// Server-side pipeline
// =============================================================================

#[tokio::test]
async fn test_ask_streams_prose_and_stores_conversation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse(&["A sepse ", "é grave."]), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let app = TestApp::new(endpoint(&server));
    let resp = app
        .router()
        .oneshot(post_json(
            "/api/ask",
            json!({"conversationId": "conv-1", "message": "o que é sepse?"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["conversationId"], "conv-1");
    assert_eq!(json["category"], "GENERAL_TUTOR");
    assert_eq!(json["response"]["kind"], "prose");
    assert_eq!(json["response"]["text"], "A sepse é grave.");
    assert_eq!(json["isError"], false);

    let resp = app.router().oneshot(get("/api/conversations")).await.unwrap();
    let list: ConversationsResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(list.conversations.len(), 1);
    assert_eq!(list.conversations[0].title, "o que é sepse?");
    assert_eq!(list.conversations[0].message_count, 2);

    let resp = app
        .router()
        .oneshot(get("/api/conversations/conv-1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["turns"][1]["content"], "A sepse é grave.");
}

#[tokio::test]
async fn test_ask_quiz_returns_document() {
    let server = MockServer::start().await;
    let quiz = json!({
        "type": "quiz",
        "title": "Cardiologia",
        "questions": [
            {"question": "Q1", "options": ["A) a", "B) b"], "correct": 0, "explanation": "e"}
        ]
    });
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "predictions": {"choices": [{"message": {"role": "assistant",
                "content": format!("Aqui está:\n```json\n{}\n```", quiz)}}]}
        })))
        .mount(&server)
        .await;

    let app = TestApp::new(endpoint(&server));
    let resp = app
        .router()
        .oneshot(post_json(
            "/api/ask",
            json!({"message": "faça um quiz de cardiologia"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert!(json["conversationId"].as_str().unwrap().starts_with("conv-"));
    assert_eq!(json["category"], "EXAM_GENERATOR");
    assert_eq!(json["response"]["kind"], "document");
    assert_eq!(json["response"]["document"]["type"], "quiz");
    assert_eq!(json["response"]["document"]["title"], "Cardiologia");
}

#[tokio::test]
async fn test_ask_without_endpoint_records_error_turn() {
    let app = TestApp::new(None);
    let resp = app
        .router()
        .oneshot(post_json("/api/ask", json!({"conversationId": "c", "message": "olá"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["isError"], true);
    assert!(json["response"]["text"]
        .as_str()
        .unwrap()
        .starts_with("⚠️ Erro:"));
}

#[tokio::test]
async fn test_ask_empty_message() {
    let app = TestApp::new(None);
    let resp = app
        .router()
        .oneshot(post_json("/api/ask", json!({"message": "  "})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ask_too_many_images() {
    let app = TestApp::new(None);
    let images: Vec<String> = (0..6).map(|i| format!("data:image/png;base64,{}", i)).collect();
    let resp = app
        .router()
        .oneshot(post_json("/api/ask", json!({"message": "veja", "images": images})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Conversation history
// =============================================================================

#[tokio::test]
async fn test_conversation_not_found() {
    let app = TestApp::new(None);
    let resp = app
        .router()
        .oneshot(get("/api/conversations/missing"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .router()
        .oneshot(delete("/api/conversations/missing"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_and_clear_conversations() {
    let app = TestApp::new(None);
    for id in ["a", "b", "c"] {
        app.router()
            .oneshot(post_json("/api/ask", json!({"conversationId": id, "message": "olá"})))
            .await
            .unwrap();
    }

    let resp = app
        .router()
        .oneshot(delete("/api/conversations/a"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["deleted"], 1);

    let resp = app
        .router()
        .oneshot(get("/api/conversations?limit=1"))
        .await
        .unwrap();
    let list: ConversationsResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(list.conversations.len(), 1);

    let resp = app.router().oneshot(delete("/api/conversations")).await.unwrap();
    assert_eq!(body_json(resp).await["deleted"], 2);
}
