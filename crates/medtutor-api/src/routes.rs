//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression,
//! body limits and all endpoint handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use medtutor_core::config::MedtutorConfig;
use medtutor_core::error::MedtutorError;

use crate::handlers;
use crate::state::AppState;

/// Chat bodies carry images as data URLs.
const CHAT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Multipart framing on top of the file itself.
const UPLOAD_OVERHEAD: usize = 1024 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let (port, max_file_size) = state
        .config
        .lock()
        .map(|c| (c.general.port, c.upload.max_file_size))
        .unwrap_or((8080, 30 * 1024 * 1024));

    // CORS middleware: allow the locally served client.
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", port),
        format!("http://localhost:{}", port),
    ]
    .iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/api/chat", post(handlers::chat_proxy))
        .route("/api/ask", post(handlers::ask))
        .route(
            "/api/upload",
            post(handlers::upload)
                .layer(DefaultBodyLimit::max(max_file_size.saturating_add(UPLOAD_OVERHEAD))),
        )
        .route("/api/limits", get(handlers::limits))
        .route(
            "/api/settings",
            get(handlers::get_settings).post(handlers::update_settings),
        )
        .route(
            "/api/conversations",
            get(handlers::list_conversations).delete(handlers::clear_conversations),
        )
        .route(
            "/api/conversations/{id}",
            get(handlers::get_conversation).delete(handlers::delete_conversation),
        )
        .layer(DefaultBodyLimit::max(CHAT_BODY_LIMIT))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured port.
///
/// Binds to 127.0.0.1 (localhost only).
pub async fn start_server(config: &MedtutorConfig, state: AppState) -> Result<(), MedtutorError> {
    let addr = format!("127.0.0.1:{}", config.general.port);
    let router = create_router(state);

    tracing::info!("Starting API server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
