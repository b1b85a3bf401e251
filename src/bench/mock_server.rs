//! Mock chat completions server that answers in buffered JSON or SSE form.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Configuration for the mock chat server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockServerConfig {
    /// Port to listen on (0 for random)
    pub port: u16,
    /// Delay before the buffered body, or before the first streamed fragment
    pub latency_ms: u64,
    /// Delay between streamed fragments
    pub chunk_latency_ms: u64,
    /// Random extra delay added to `latency_ms`, up to this many milliseconds
    pub jitter_ms: u64,
    /// Content fragments, one SSE chunk each
    pub fragments: Vec<String>,
    /// `usage.total_tokens` of buffered responses
    pub total_tokens: u64,
    /// Emit a non-JSON `data:` line before the first chunk
    pub keepalive: bool,
    /// Error rate (0.0 to 1.0)
    pub error_rate: f64,
    /// Requests whose user message contains this text hang for `stall_ms`
    pub stall_marker: Option<String>,
    pub stall_ms: u64,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            latency_ms: 20,
            chunk_latency_ms: 5,
            jitter_ms: 0,
            fragments: vec![
                "The".to_string(),
                " quick".to_string(),
                " brown".to_string(),
                " fox".to_string(),
                " jumps".to_string(),
            ],
            total_tokens: 42,
            keepalive: false,
            error_rate: 0.0,
            stall_marker: None,
            stall_ms: 0,
        }
    }
}

struct MockState {
    config: MockServerConfig,
    requests: AtomicU64,
}

/// Mock chat completions server for tests and standalone runs
pub struct MockChatServer {
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
}

impl MockChatServer {
    /// Create a new mock server with the given configuration
    pub fn new(config: MockServerConfig) -> Self {
        Self {
            state: Arc::new(MockState {
                config,
                requests: AtomicU64::new(0),
            }),
            shutdown_tx: None,
            port: 0,
        }
    }

    /// Start the mock server and return the actual port
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("127.0.0.1:{}", self.state.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        self.port = port;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let app = Router::new()
            .route(CHAT_COMPLETIONS_PATH, post(handle_chat))
            .with_state(self.state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        tracing::debug!(port, "Mock chat server listening");
        Ok(port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Full chat completions URL
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, CHAT_COMPLETIONS_PATH)
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> u64 {
        self.state.requests.load(Ordering::Relaxed)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockChatServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_chat(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.requests.fetch_add(1, Ordering::Relaxed);
    let config = &state.config;

    if config.error_rate > 0.0 && rand::thread_rng().gen::<f64>() < config.error_rate {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Simulated error").into_response();
    }

    let user_message = body["messages"]
        .as_array()
        .and_then(|messages| messages.iter().rev().find(|m| m["role"] == "user"))
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default();

    if let Some(marker) = &config.stall_marker {
        if user_message.contains(marker.as_str()) {
            tokio::time::sleep(Duration::from_millis(config.stall_ms)).await;
        }
    }

    let delay = Duration::from_millis(config.latency_ms + jitter(config.jitter_ms));
    let completion_id = format!("chatcmpl-{}", uuid::Uuid::new_v4().simple());

    if body["stream"].as_bool().unwrap_or(false) {
        let stream = generate_stream(state.clone(), completion_id, delay);
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(stream))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }

    tokio::time::sleep(delay).await;
    let content: String = config.fragments.concat();
    Json(json!({
        "id": completion_id,
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": user_message.split_whitespace().count(),
            "completion_tokens": config.fragments.len(),
            "total_tokens": config.total_tokens
        }
    }))
    .into_response()
}

/// Stream role chunk, content fragments, finish chunk and `[DONE]`
fn generate_stream(
    state: Arc<MockState>,
    completion_id: String,
    first_delay: Duration,
) -> impl futures::Stream<Item = Result<bytes::Bytes, std::io::Error>> {
    async_stream::stream! {
        let config = &state.config;

        yield Ok(sse_chunk(&completion_id, json!({"role": "assistant"}), None));

        if config.keepalive {
            yield Ok(bytes::Bytes::from_static(b"data: keep-alive\n\n"));
        }

        tokio::time::sleep(first_delay).await;

        for (i, fragment) in config.fragments.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(config.chunk_latency_ms)).await;
            }
            yield Ok(sse_chunk(&completion_id, json!({"content": fragment}), None));
        }

        yield Ok(sse_chunk(&completion_id, json!({}), Some("stop")));
        yield Ok(bytes::Bytes::from_static(b"data: [DONE]\n\n"));
    }
}

fn sse_chunk(id: &str, delta: Value, finish_reason: Option<&str>) -> bytes::Bytes {
    let event = json!({
        "id": id,
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
    });
    bytes::Bytes::from(format!("data: {}\n\n", event))
}

fn jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> MockServerConfig {
        MockServerConfig {
            latency_ms: 1,
            chunk_latency_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_mock_server_buffered() {
        let mut server = MockChatServer::new(fast_config());
        let port = server.start().await.unwrap();
        assert!(port > 0);

        let resp = reqwest::Client::new()
            .post(server.endpoint())
            .json(&json!({"messages": [{"role": "user", "content": "hi"}], "stream": false}))
            .send()
            .await
            .unwrap();

        assert!(resp.status().is_success());
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["usage"]["total_tokens"], 42);
        assert_eq!(body["choices"][0]["message"]["content"], "The quick brown fox jumps");
        assert_eq!(server.request_count(), 1);
        server.stop();
    }

    #[tokio::test]
    async fn test_mock_server_streaming() {
        let mut server = MockChatServer::new(fast_config());
        server.start().await.unwrap();

        let text = reqwest::Client::new()
            .post(server.endpoint())
            .json(&json!({"messages": [], "stream": true}))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(text.starts_with("data: {"));
        assert!(text.contains("\"content\":\" fox\""));
        assert!(text.trim_end().ends_with("data: [DONE]"));
    }

    #[tokio::test]
    async fn test_mock_server_error_rate() {
        let mut server = MockChatServer::new(MockServerConfig {
            error_rate: 1.0,
            ..fast_config()
        });
        server.start().await.unwrap();

        let resp = reqwest::Client::new()
            .post(server.endpoint())
            .json(&json!({"messages": []}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
