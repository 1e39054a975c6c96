use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{RelayError, RelayResult};
use crate::llm::provider::{ChunkStream, LlmProvider};
use crate::llm::sse_parser::{self, LineBuffer};
use crate::llm::types::{CallConfig, ChatMessage, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    /// Built once and reused, so connections are pooled across requests.
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    async fn send(
        &self,
        messages: Vec<ChatMessage>,
        cfg: &CallConfig,
        stream: bool,
    ) -> RelayResult<reqwest::Response> {
        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": stream,
            "temperature": cfg.temperature,
        });
        if cfg.json_response {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = stream,
            "sending LLM request"
        );
        tracing::debug!(
            body = %sanitized_for_log(&body),
            "request body (sanitized, base64 omitted)"
        );

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(RelayError::LlmProvider(format!("{}: {}", status, err_body)));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        cfg: &CallConfig,
    ) -> RelayResult<ChunkStream> {
        let response = self.send(messages, cfg, true).await?;
        let provider = self.id.clone();
        let mut byte_stream = response.bytes_stream();

        let chunks = async_stream::stream! {
            let mut lines = LineBuffer::default();
            let mut content_len = 0usize;
            let mut ended = false;

            while !ended {
                let batch: Vec<String> = match byte_stream.next().await {
                    Some(Ok(bytes)) => lines.push(&bytes),
                    Some(Err(e)) => {
                        yield Err(RelayError::Http(e));
                        break;
                    }
                    None => {
                        ended = true;
                        lines.finish().into_iter().collect()
                    }
                };

                for line in batch {
                    match sse_parser::parse_sse_line(&line) {
                        Ok(Some(chunk)) if chunk.kind == StreamChunkKind::Done => {
                            ended = true;
                            break;
                        }
                        Ok(Some(chunk)) => {
                            if chunk.kind == StreamChunkKind::Content {
                                content_len += chunk.content.len();
                            }
                            yield Ok(chunk);
                        }
                        Ok(None) => {}
                        Err(RelayError::SseParsing(e)) => {
                            tracing::debug!("SSE parse skipped: {e}");
                        }
                        Err(e) => {
                            yield Err(e);
                            ended = true;
                            break;
                        }
                    }
                }
            }

            tracing::info!(provider = %provider, content_len, "LLM stream complete");
        };

        Ok(Box::pin(chunks))
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> RelayResult<String> {
        let response = self.send(messages, cfg, false).await?;
        let body = response.text().await?;
        let json: serde_json::Value = serde_json::from_str(&body)?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        tracing::info!(
            provider = %self.id,
            content_len = content.len(),
            "LLM JSON response received"
        );
        Ok(content)
    }
}

/// Copy of the request body with base64 image payloads replaced, for logging only.
fn sanitized_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            // content can be string or array of parts; only the array case carries images.
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                    if let Some(url) = part.pointer_mut("/image_url/url") {
                        *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}
