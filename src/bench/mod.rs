//! Load benchmark for OpenAI-style chat completion endpoints.
//!
//! This module provides:
//! - Concurrency runner that fans out one round of parallel calls at a time
//! - Per-level statistics (throughput, latency, time to first token)
//! - Report formatting with pluggable output sinks
//! - Driver that walks the configured concurrency levels
//! - Mock chat completions server (buffered JSON and SSE)

pub mod driver;
pub mod metrics;
pub mod mock_server;
pub mod report;
pub mod runner;

pub use driver::{Driver, RunSummary};
pub use metrics::{LevelReport, LevelStatistics, RoundTotals};
pub use mock_server::{MockChatServer, MockServerConfig};
pub use report::{FileSink, MemorySink, ReportSink, Reporter, RunHeader, StdoutSink};
pub use runner::ConcurrencyRunner;
