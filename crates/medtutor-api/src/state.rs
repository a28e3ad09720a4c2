//! Application state shared across all route handlers.
//!
//! AppState holds references to all services and shared resources.
//! It is passed to handlers via axum's State extractor.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use medtutor_chat::transport::transport_from_config;
use medtutor_chat::ChatOrchestrator;
use medtutor_core::config::{MedtutorConfig, ProviderConfig};
use medtutor_core::error::MedtutorError;
use medtutor_storage::ConversationStore;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Shared application state.
///
/// All fields use `Arc` (or are cheap to clone) for sharing across handler
/// tasks. The configuration is protected by a `Mutex`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, updated by `/api/settings`.
    pub config: Arc<Mutex<MedtutorConfig>>,
    /// Where settings updates are persisted.
    pub config_path: PathBuf,
    /// Conversation history store.
    pub store: Arc<dyn ConversationStore>,
    /// Pooled HTTP client for provider calls.
    pub client: reqwest::Client,
    /// Server-side chat pipeline.
    pub orchestrator: Arc<ChatOrchestrator>,
}

impl AppState {
    pub fn new(
        config: MedtutorConfig,
        config_path: PathBuf,
        store: Arc<dyn ConversationStore>,
    ) -> Result<Self, MedtutorError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| MedtutorError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let transport = transport_from_config(client.clone(), &config.provider);
        let orchestrator =
            ChatOrchestrator::from_config(transport, &config.chat).with_store(Arc::clone(&store));

        Ok(Self {
            config: Arc::new(Mutex::new(config)),
            config_path,
            store,
            client,
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// Point the orchestrator at new provider settings.
    pub fn refresh_transport(&self, provider: &ProviderConfig) {
        self.orchestrator
            .set_transport(transport_from_config(self.client.clone(), provider));
    }
}
