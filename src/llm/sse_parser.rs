use crate::errors::{RelayError, RelayResult};
use crate::llm::types::{StreamChunk, StreamChunkKind};

/// Parses a raw SSE line (OpenAI-compatible format) into a StreamChunk.
/// Returns None if the line is a keep-alive, a non-data line, or a delta
/// without text.
pub fn parse_sse_line(line: &str) -> RelayResult<Option<StreamChunk>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let data = if let Some(d) = line.strip_prefix("data:") {
        d.trim()
    } else {
        return Ok(None);
    };

    if data == "[DONE]" {
        return Ok(Some(StreamChunk::done()));
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| RelayError::SseParsing(e.to_string()))?;

    if let Some(message) = json["error"]["message"].as_str() {
        return Err(RelayError::LlmProvider(message.to_string()));
    }

    if let Some(choices) = json["choices"].as_array() {
        if let Some(first) = choices.first() {
            let delta = &first["delta"];

            // Some models (DeepSeek and friends) expose their reasoning separately.
            if let Some(reasoning) = delta["reasoning_content"].as_str() {
                if !reasoning.is_empty() {
                    return Ok(Some(StreamChunk {
                        kind: StreamChunkKind::Reasoning,
                        content: reasoning.to_string(),
                    }));
                }
            }

            if let Some(content) = delta["content"].as_str() {
                if !content.is_empty() {
                    return Ok(Some(StreamChunk::content(content)));
                }
            }

            if first["finish_reason"].as_str().is_some() {
                return Ok(Some(StreamChunk::done()));
            }
        }
    }

    Ok(None)
}

/// Splits an upstream response body into trimmed, non-empty lines.
///
/// Bytes stay raw until a newline arrives, so a multi-byte character that is
/// split across two network reads is decoded whole.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Feeds one network read and returns every line it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte != b'\n' {
                self.pending.push(byte);
                continue;
            }
            if let Some(line) = self.take_line() {
                lines.push(line);
            }
        }
        lines
    }

    /// The trailing line of a body that ended without a newline.
    pub fn finish(&mut self) -> Option<String> {
        self.take_line()
    }

    fn take_line(&mut self) -> Option<String> {
        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!line.is_empty()).then_some(line)
    }
}
