use bytes::{Buf, BytesMut};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

// ==================================================================================================
// SSE Line Splitting
// ==================================================================================================

/// Prefix of payload-bearing server-sent-event lines
pub const DATA_PREFIX: &str = "data:";

/// Payload that terminates a chat completion stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Splits a chunked byte stream into text lines.
///
/// Bytes are buffered until a `\n` arrives, so a multi-byte UTF-8 sequence
/// or a JSON payload split across network chunks is reassembled before it
/// is decoded.
#[derive(Debug, Default)]
pub struct SseLineParser {
    buffer: BytesMut,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the parser and return every complete line.
    ///
    /// Line terminators (`\n` or `\r\n`) are stripped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw = self.buffer.split_to(pos);
            self.buffer.advance(1);
            lines.push(decode_line(&raw));
        }
        lines
    }

    /// Return the trailing unterminated line, if any.
    pub fn finalize(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = self.buffer.split();
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

// ==================================================================================================
// Line Classification
// ==================================================================================================

/// Meaning of one stream line
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// `data:` line carrying a JSON object
    Data(Value),
    /// `data: [DONE]`
    Done,
    /// `data:` line whose payload is not JSON (keep-alives, junk)
    Malformed,
    /// Blank lines, comments, `event:`/`id:` fields
    Ignored,
}

pub fn classify_line(line: &str) -> SseLine {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return SseLine::Ignored;
    };

    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return SseLine::Done;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(json) => SseLine::Data(json),
        Err(e) => {
            debug!(
                error = %e,
                payload = %payload.chars().take(100).collect::<String>(),
                "Skipping malformed stream payload"
            );
            SseLine::Malformed
        }
    }
}

/// Incremental text at `choices[0].delta.content`, if present.
pub fn delta_content(payload: &Value) -> Option<&str> {
    payload
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
}

// ==================================================================================================
// Delta Accumulation
// ==================================================================================================

/// Result of consuming a complete stream
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    /// Content-bearing chunks observed (one chunk is counted as one token)
    pub token_count: u64,
    /// Concatenated content fragments
    pub text: String,
    pub time_to_first_token: Duration,
    pub total_latency: Duration,
}

/// Folds stream lines into token count, collected text and first-token time.
#[derive(Debug)]
pub struct DeltaAccumulator {
    start: Instant,
    first_token: Option<Duration>,
    token_count: u64,
    text: String,
    done: bool,
}

impl DeltaAccumulator {
    /// `start` is the instant the request was issued.
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            first_token: None,
            token_count: 0,
            text: String::new(),
            done: false,
        }
    }

    /// Process one line. Returns `false` once the terminating sentinel is seen.
    pub fn push_line(&mut self, line: &str) -> bool {
        if self.done {
            return false;
        }

        match classify_line(line) {
            SseLine::Done => {
                self.done = true;
            }
            SseLine::Data(payload) => {
                if let Some(fragment) = delta_content(&payload) {
                    self.push_fragment(fragment);
                }
            }
            SseLine::Malformed | SseLine::Ignored => {}
        }

        !self.done
    }

    fn push_fragment(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        if self.first_token.is_none() {
            self.first_token = Some(self.start.elapsed());
        }
        self.token_count += 1;
        self.text.push_str(fragment);
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    /// Close the measurement now.
    ///
    /// Without any content the first-token time falls back to the total latency.
    pub fn finish(self) -> StreamSummary {
        let total_latency = self.start.elapsed();
        StreamSummary {
            token_count: self.token_count,
            text: self.text,
            time_to_first_token: self.first_token.unwrap_or(total_latency),
            total_latency,
        }
    }
}
