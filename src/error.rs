// Error handling module
// Defines the error type shared by the invoker, runner and driver

use thiserror::Error;

/// Errors that can occur while running a benchmark
#[derive(Error, Debug)]
pub enum BenchError {
    /// The call did not finish within the configured bound
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Connection, protocol or body transfer failure
    #[error("Transport error ({kind}): {source}")]
    Transport {
        kind: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Endpoint answered with a non-success status
    #[error("Endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Local file I/O (log file, transcript, prompt file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request task panicked or was cancelled
    #[error("Request task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Prompt pools must hold at least one prompt
    #[error("Prompt pool is empty")]
    EmptyPromptPool,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BenchError {
    /// Classify a reqwest error, mapping timeouts to [`BenchError::Timeout`].
    pub fn from_reqwest(err: reqwest::Error, timeout: std::time::Duration) -> Self {
        if err.is_timeout() {
            return BenchError::Timeout(timeout);
        }

        let kind = if err.is_connect() {
            "connection_failed"
        } else if err.is_request() {
            "request_error"
        } else if err.is_body() {
            "body_error"
        } else if err.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };

        BenchError::Transport { kind, source: err }
    }

    /// Whether this error came from the remote side rather than local setup
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            BenchError::Timeout(_) | BenchError::Transport { .. } | BenchError::Status { .. }
        )
    }
}

/// Result type alias for benchmark operations
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_messages() {
        let err = BenchError::Status {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "Endpoint returned 503: overloaded");

        let err = BenchError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Request timed out after 250ms");

        let err = BenchError::EmptyPromptPool;
        assert_eq!(err.to_string(), "Prompt pool is empty");
    }

    #[test]
    fn test_config_error_message() {
        let err = BenchError::Config("bad mode".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad mode");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: BenchError = io.into();
        assert!(matches!(err, BenchError::Io(_)));
        assert!(!err.is_remote());
    }

    #[test]
    fn test_remote_classification() {
        assert!(BenchError::Timeout(Duration::from_secs(1)).is_remote());
        assert!(BenchError::Status {
            status: 500,
            body: String::new()
        }
        .is_remote());
        assert!(!BenchError::EmptyPromptPool.is_remote());
        assert!(!BenchError::Config("x".into()).is_remote());
    }

    #[tokio::test]
    async fn test_from_reqwest_connection_refused() {
        // Port 9 (discard) on localhost is closed in test environments
        let client = reqwest::Client::new();
        let err = client
            .post("http://127.0.0.1:9/v1/chat/completions")
            .send()
            .await
            .unwrap_err();

        let mapped = BenchError::from_reqwest(err, Duration::from_secs(5));
        assert!(mapped.is_remote());
        assert!(!matches!(mapped, BenchError::Timeout(_)));
    }
}
