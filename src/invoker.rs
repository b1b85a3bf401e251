use futures::StreamExt;
use reqwest::{Client, Response, Url};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{BenchConfig, Mode};
use crate::error::{BenchError, Result};
use crate::streaming::{DeltaAccumulator, SseLineParser, StreamSummary};
use crate::transcript::TranscriptWriter;

/// Error bodies longer than this are cut before they end up in an error
const MAX_ERROR_BODY_CHARS: usize = 500;

// ==================================================================================================
// Request Body
// ==================================================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Chat completions request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub messages: [ChatMessage<'a>; 2],
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

// ==================================================================================================
// Settings & Outcome
// ==================================================================================================

/// Everything the invoker needs to build one request
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub endpoint: Url,
    pub mode: Mode,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl RequestSettings {
    pub fn from_config(config: &BenchConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            BenchError::Config(format!("invalid endpoint {}: {}", config.endpoint, e))
        })?;

        Ok(Self {
            endpoint,
            mode: config.mode,
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    pub fn request_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: self.model.as_deref(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: self.mode.is_streaming(),
        }
    }
}

/// Measurements of one completed call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestOutcome {
    /// Request start to end of the response body
    pub total_latency: Duration,
    /// `usage.total_tokens` in buffered mode, content chunks in streaming mode
    pub token_count: u64,
    /// Streaming mode only; equals `total_latency` when no content arrived
    pub time_to_first_token: Option<Duration>,
}

// ==================================================================================================
// Invoker
// ==================================================================================================

/// Issues single chat completion calls and times them
pub struct RequestInvoker {
    client: Client,
    settings: RequestSettings,
    transcript: Option<Arc<TranscriptWriter>>,
}

impl RequestInvoker {
    pub fn new(settings: RequestSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .pool_max_idle_per_host(512)
            .build()
            .map_err(|e| BenchError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            settings,
            transcript: None,
        })
    }

    /// Attach the writer used when a call is flagged for capture
    pub fn with_transcript(mut self, writer: Arc<TranscriptWriter>) -> Self {
        self.transcript = Some(writer);
        self
    }

    pub fn settings(&self) -> &RequestSettings {
        &self.settings
    }

    /// Run one call in the configured mode.
    ///
    /// `capture` asks a streaming call to write its prompt and response to
    /// the transcript; it is ignored in buffered mode.
    pub async fn invoke(&self, prompt: &str, capture: bool) -> Result<RequestOutcome> {
        match self.settings.mode {
            Mode::Buffered => self.invoke_buffered(prompt).await,
            Mode::Streaming => {
                let summary = self.stream(prompt).await?;

                if capture {
                    self.capture(prompt, &summary.text).await;
                }

                Ok(RequestOutcome {
                    total_latency: summary.total_latency,
                    token_count: summary.token_count,
                    time_to_first_token: Some(summary.time_to_first_token),
                })
            }
        }
    }

    async fn invoke_buffered(&self, prompt: &str) -> Result<RequestOutcome> {
        let start = Instant::now();
        let response = self.send(prompt).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| BenchError::from_reqwest(e, self.settings.timeout))?;
        let total_latency = start.elapsed();

        Ok(RequestOutcome {
            total_latency,
            token_count: extract_total_tokens(&body),
            time_to_first_token: None,
        })
    }

    /// Consume one streaming completion and return its summary.
    pub async fn stream(&self, prompt: &str) -> Result<StreamSummary> {
        let start = Instant::now();
        let response = self.send(prompt).await?;

        let mut accumulator = DeltaAccumulator::new(start);
        let mut parser = SseLineParser::new();
        let mut body = response.bytes_stream();

        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| BenchError::from_reqwest(e, self.settings.timeout))?;
            for line in parser.feed(&chunk) {
                if !accumulator.push_line(&line) {
                    break 'read;
                }
            }
        }

        if !accumulator.is_done() {
            if let Some(line) = parser.finalize() {
                accumulator.push_line(&line);
            }
        }

        let summary = accumulator.finish();
        tracing::trace!(
            tokens = summary.token_count,
            latency_ms = summary.total_latency.as_millis() as u64,
            ttft_ms = summary.time_to_first_token.as_millis() as u64,
            "Stream finished"
        );
        Ok(summary)
    }

    async fn send(&self, prompt: &str) -> Result<Response> {
        let body = self.settings.request_body(prompt);
        let mut request = self.client.post(self.settings.endpoint.clone()).json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BenchError::from_reqwest(e, self.settings.timeout))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        tracing::warn!(
            status = status.as_u16(),
            url = %self.settings.endpoint,
            response_body = %body,
            "Endpoint returned error status"
        );

        Err(BenchError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn capture(&self, prompt: &str, response: &str) {
        let Some(writer) = &self.transcript else {
            return;
        };
        if let Err(e) = writer.write(prompt, response).await {
            tracing::warn!(
                path = %writer.path().display(),
                error = %e,
                "Failed to write sample transcript"
            );
        }
    }
}

/// Read `usage.total_tokens` from a buffered response body.
///
/// Absent, malformed or non-integer usage counts as zero tokens.
pub fn extract_total_tokens(body: &[u8]) -> u64 {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Response body is not JSON, counting 0 tokens");
            return 0;
        }
    };

    match payload
        .get("usage")
        .and_then(|usage| usage.get("total_tokens"))
        .and_then(Value::as_u64)
    {
        Some(tokens) => tokens,
        None => {
            tracing::debug!("Response has no usable usage.total_tokens, counting 0 tokens");
            0
        }
    }
}
