use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::errors::RelayResult;
use crate::llm::types::{CallConfig, ChatMessage, StreamChunk};

/// Chunks in emission order. An `Err` item means the stream broke mid-way.
pub type ChunkStream = Pin<Box<dyn Stream<Item = RelayResult<StreamChunk>> + Send>>;

/// Upstream multimodal model. Implementations are shared across requests and
/// hold no per-request state.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// Starts a streaming completion. Errors here mean nothing was generated.
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        cfg: &CallConfig,
    ) -> RelayResult<ChunkStream>;

    /// One-shot completion; returns the full reply text.
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> RelayResult<String>;
}
