//! MedTutor API crate: axum HTTP server and route handlers.
//!
//! Serves the model proxy (streaming and non-streaming), image upload,
//! settings, conversation history, and a server-side pipeline endpoint.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
