use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::commands::{self, AppState};
use crate::config::ServerConfig;
use crate::errors::RelayResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(commands::health))
        .route("/ask", post(commands::ask))
        .route("/ask/json", post(commands::ask_json))
        .layer(TraceLayer::new_for_http())
        // Any origin, method and header; preflight requests are answered here.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(config: &ServerConfig, state: AppState) -> RelayResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "daw-assist listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
