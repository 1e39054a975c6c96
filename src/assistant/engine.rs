use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::Instrument;

use crate::assistant::prompt;
use crate::config::{AppConfig, GroundingConfig};
use crate::errors::{RelayError, RelayResult};
use crate::grounding::fallback;
use crate::grounding::parser::StreamParser;
use crate::grounding::types::AnswerEvent;
use crate::llm::registry::ProviderRegistry;
use crate::llm::types::StreamChunkKind;
use crate::perception::screenshot::Screenshot;
use crate::perception::types::ScreenshotMeta;

/// Events buffered between the engine task and the HTTP response.
const EVENT_BUFFER: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub screenshot: Option<String>,
}

/// Answers questions against the shared provider registry. Holds no
/// per-request state; every call builds its own parser.
pub struct AssistantEngine {
    registry: Arc<ProviderRegistry>,
    grounding: GroundingConfig,
    product: String,
}

impl AssistantEngine {
    pub fn new(registry: Arc<ProviderRegistry>, config: &AppConfig) -> Self {
        Self {
            registry,
            grounding: config.grounding.clone(),
            product: config.prompts.product.clone(),
        }
    }

    /// Streams answer events for one request. The receiver always yields at
    /// least one event, and the last one is terminal. Dropping the receiver
    /// stops the upstream stream.
    pub fn ask_stream(self: &Arc<Self>, request: AskRequest) -> mpsc::Receiver<AnswerEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let engine = Arc::clone(self);
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("ask", request_id = %request_id, stream = true);
        tokio::spawn(async move { engine.run_stream(request, tx).await }.instrument(span));
        rx
    }

    /// Single-JSON answer. Never fails; errors become the answer text.
    pub async fn ask_json(&self, request: AskRequest) -> AnswerEvent {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("ask", request_id = %request_id, stream = false);
        async {
            match self.json_answer(request).await {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "model call failed");
                    error_event(&e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_stream(&self, request: AskRequest, tx: mpsc::Sender<AnswerEvent>) {
        let terminal = match self.stream_answer(request, &tx).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::info!("client disconnected; upstream stream dropped");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "model stream failed");
                error_event(&e)
            }
        };
        tracing::info!(bbox = ?terminal.bbox, "answer complete");
        let _ = tx.send(terminal).await;
    }

    /// Returns the terminal event, or `None` once the client has gone away.
    async fn stream_answer(
        &self,
        request: AskRequest,
        tx: &mpsc::Sender<AnswerEvent>,
    ) -> RelayResult<Option<AnswerEvent>> {
        let screenshot = load_screenshot(&request);
        let meta = screenshot.as_ref().and_then(|s| s.meta);
        let system = prompt::streaming_system_prompt(&self.product, screenshot.as_ref());
        let messages =
            prompt::build_messages(system, &self.product, &request.query, screenshot.as_ref());

        let (provider, cfg) = self.registry.active_call(false)?;
        tracing::info!(
            provider = provider.name(),
            model = %cfg.model,
            has_screenshot = screenshot.is_some(),
            "asking model"
        );

        let limit = self.grounding.stream_timeout_secs;
        let deadline = Instant::now() + Duration::from_secs(limit);
        let started = tokio::select! {
            _ = tx.closed() => return Ok(None),
            started = timeout_at(deadline, provider.stream_chat(messages, &cfg)) => started,
        };
        let mut chunks = started.map_err(|_| RelayError::Timeout(limit))??;

        let mut parser = StreamParser::new(self.grounding.text_mode);
        loop {
            let next = tokio::select! {
                _ = tx.closed() => return Ok(None),
                next = timeout_at(deadline, chunks.next()) => next,
            };
            let next = next.map_err(|_| RelayError::Timeout(limit))?;
            let Some(chunk) = next else { break };
            let chunk = chunk?;
            if chunk.kind != StreamChunkKind::Content {
                continue;
            }
            let Some(event) = parser.push(&chunk.content) else {
                continue;
            };
            if event.is_terminal() {
                return Ok(Some(self.bounded(event, meta)));
            }
            if tx.send(event).await.is_err() {
                return Ok(None);
            }
        }

        tracing::debug!(
            response_len = parser.response_len(),
            "stream ended without inline marker"
        );
        Ok(Some(self.bounded(parser.finish(), meta)))
    }

    async fn json_answer(&self, request: AskRequest) -> RelayResult<AnswerEvent> {
        let screenshot = load_screenshot(&request);
        let meta = screenshot.as_ref().and_then(|s| s.meta);
        let system = prompt::json_system_prompt(&self.product, screenshot.as_ref());
        let messages =
            prompt::build_messages(system, &self.product, &request.query, screenshot.as_ref());

        let (provider, cfg) = self.registry.active_call(true)?;
        tracing::info!(
            provider = provider.name(),
            model = %cfg.model,
            has_screenshot = screenshot.is_some(),
            "asking model"
        );

        let limit = self.grounding.stream_timeout_secs;
        let call = provider.chat(messages, &cfg);
        let reply = tokio::time::timeout(Duration::from_secs(limit), call)
            .await
            .map_err(|_| RelayError::Timeout(limit))??;
        Ok(self.bounded(fallback::resolve(&reply), meta))
    }

    fn bounded(&self, mut event: AnswerEvent, meta: Option<ScreenshotMeta>) -> AnswerEvent {
        if let Some(bbox) = event.bbox {
            event.bbox = self.grounding.bounds.apply(bbox, meta.as_ref());
        }
        event
    }
}

fn load_screenshot(request: &AskRequest) -> Option<Screenshot> {
    request
        .screenshot
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(Screenshot::from_base64)
}

fn error_event(e: &RelayError) -> AnswerEvent {
    AnswerEvent::terminal(format!("Error calling model API: {e}"), None)
}
