use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use futures_util::stream;
use tower::ServiceExt;

use daw_assist::assistant::engine::AssistantEngine;
use daw_assist::commands::AppState;
use daw_assist::config::{AppConfig, LlmConfig};
use daw_assist::errors::{RelayError, RelayResult};
use daw_assist::llm::provider::{ChunkStream, LlmProvider};
use daw_assist::llm::registry::ProviderRegistry;
use daw_assist::llm::types::{CallConfig, ChatMessage, StreamChunk};
use daw_assist::server::router;

/// Replays fixed chunks; fails every call when `chunks` is `None`.
struct ReplayProvider {
    chunks: Option<Vec<&'static str>>,
}

#[async_trait]
impl LlmProvider for ReplayProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream_chat(
        &self,
        _messages: Vec<ChatMessage>,
        _cfg: &CallConfig,
    ) -> RelayResult<ChunkStream> {
        match &self.chunks {
            Some(chunks) => {
                let items: Vec<RelayResult<StreamChunk>> =
                    chunks.iter().map(|c| Ok(StreamChunk::content(*c))).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            None => Err(RelayError::LlmProvider("503 Service Unavailable".into())),
        }
    }

    async fn chat(&self, _messages: Vec<ChatMessage>, _cfg: &CallConfig) -> RelayResult<String> {
        match &self.chunks {
            Some(chunks) => Ok(chunks.concat()),
            None => Err(RelayError::LlmProvider("503 Service Unavailable".into())),
        }
    }
}

fn app(chunks: Option<Vec<&'static str>>) -> axum::Router {
    let mut registry = ProviderRegistry::new(LlmConfig::default());
    registry.register(Arc::new(ReplayProvider { chunks }));
    let engine = Arc::new(AssistantEngine::new(Arc::new(registry), &AppConfig::default()));
    router(AppState { engine })
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn sse_events(body: &str) -> Vec<serde_json::Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn health_reports_ok() {
    let response = app(Some(vec![]))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn ask_streams_events_until_terminal() {
    let response = app(Some(vec!["The mixer is ", "on the right. [BBOX:1700,100,1900,600]"]))
        .oneshot(post_json(
            "/ask",
            serde_json::json!({ "query": "Where is the mixer?", "screenshot": null }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let events = sse_events(&body_string(response).await);
    assert_eq!(
        events,
        vec![
            serde_json::json!({ "text": "The mixer is ", "bbox": null, "streaming": true }),
            serde_json::json!({
                "text": "The mixer is on the right.",
                "bbox": [1700, 100, 1900, 600],
                "streaming": false
            }),
        ]
    );
}

#[tokio::test]
async fn ask_upstream_error_is_a_single_event() {
    let response = app(None)
        .oneshot(post_json("/ask", serde_json::json!({ "query": "Where is the mixer?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let events = sse_events(&body_string(response).await);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["bbox"], serde_json::Value::Null);
    assert_eq!(events[0]["streaming"], false);
    assert!(events[0]["text"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn ask_json_returns_structured_answer() {
    let response = app(Some(vec![r#"{"bbox":[1,2,3,4],"text":"ok"}"#]))
        .oneshot(post_json("/ask/json", serde_json::json!({ "query": "Where?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "text": "ok", "bbox": [1, 2, 3, 4], "streaming": false })
    );
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/ask")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app(Some(vec![])).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
