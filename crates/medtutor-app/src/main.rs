//! MedTutor application binary - composition root.
//!
//! Ties the MedTutor crates into a single executable:
//! 1. Parse CLI arguments
//! 2. Load configuration from TOML, then env and CLI overrides
//! 3. Open the conversation database
//! 4. Run the requested command: the HTTP server, the terminal chat or
//!    the conversation listing

mod cli;
mod repl;
mod study;

use std::sync::Arc;

use clap::Parser;

use medtutor_api::routes;
use medtutor_api::state::AppState;
use medtutor_core::config::MedtutorConfig;
use medtutor_storage::{ConversationStore, Database, SqliteConversationStore};

use cli::{CliArgs, Command};
use repl::Repl;

/// Priority: --log-level > RUST_LOG > config (warn for the terminal chat).
fn init_tracing(explicit: Option<&str>, fallback: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = match explicit {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_default_env()
            .ok()
            .or_else(|| EnvFilter::try_new(fallback).ok()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter.unwrap_or_else(|| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let command = args.command();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = MedtutorConfig::load_or_default(&config_file);
    config.apply_env_overrides();
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Command::Serve { port: Some(port) } = command {
        config.general.port = port;
    }
    config.validate()?;

    // Tracing.
    init_tracing(
        args.log_level.as_deref(),
        &args.resolve_log_level(&config.general.log_level),
    );

    tracing::info!("Starting MedTutor v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = config.data_dir();
    let db = Database::open_in(&data_dir).inspect_err(|e| {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to open database");
    })?;
    tracing::info!(path = %data_dir.display(), "SQLite database opened");
    let store: Arc<dyn ConversationStore> = Arc::new(SqliteConversationStore::new(Arc::new(db)));

    match command {
        Command::History { limit } => {
            repl::print_history(store.as_ref(), limit, &mut std::io::stdout())?;
        }
        Command::Chat { conversation } => {
            let upload = config.upload.clone();
            let state = AppState::new(config, config_file, store)?;
            let mut repl = Repl::new(Arc::clone(&state.orchestrator), state.store, upload);
            repl.run_stdio(conversation.as_deref()).await?;
        }
        Command::Serve { .. } => {
            if config.provider.endpoint_url.is_none() {
                tracing::warn!(
                    "No provider endpoint configured; set it in the settings or MEDTUTOR_ENDPOINT_URL"
                );
            }
            let state = AppState::new(config.clone(), config_file, store)?;
            if let Err(e) = routes::start_server(&config, state).await {
                tracing::error!(port = config.general.port, error = %e, "API server failed - is another instance running?");
                tracing::error!("Try: medtutor serve --port {}", config.general.port.saturating_add(1));
                return Err(e.into());
            }
        }
    }

    Ok(())
}
