pub mod assistant;
pub mod commands;
pub mod config;
pub mod errors;
pub mod grounding;
pub mod llm;
pub mod perception;
pub mod server;

use std::sync::Arc;

use crate::assistant::engine::AssistantEngine;
use crate::commands::AppState;
use crate::errors::RelayResult;
use crate::llm::registry::ProviderRegistry;

pub async fn run() -> RelayResult<()> {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::load_config()?;

    // One registry, and one HTTP client per provider, for the whole process.
    let registry = Arc::new(ProviderRegistry::from_config(&config.llm));
    let engine = Arc::new(AssistantEngine::new(registry, &config));

    server::serve(&config.server, AppState { engine }).await
}
