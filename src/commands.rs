use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;

use crate::assistant::engine::{AskRequest, AssistantEngine};
use crate::grounding::types::AnswerEvent;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AssistantEngine>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Streamed answer: one `data:` line per event, the last one terminal.
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(query_len = request.query.len(), "ask");
    let events =
        ReceiverStream::new(state.engine.ask_stream(request)).map(|event| Ok(to_sse(&event)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Single-JSON answer.
pub async fn ask_json(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Json<AnswerEvent> {
    tracing::info!(query_len = request.query.len(), "ask_json");
    Json(state.engine.ask_json(request).await)
}

fn to_sse(event: &AnswerEvent) -> Event {
    match Event::default().json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            tracing::error!(error = %e, "answer event not serializable");
            Event::default().data(r#"{"text":"","bbox":null,"streaming":false}"#)
        }
    }
}
