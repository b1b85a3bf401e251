// Integration tests for Chat Loadbench
//
// These tests run the full benchmark path (invoker, runner, statistics,
// reporter, driver) against the in-process mock chat server.

use std::sync::Arc;
use std::time::Duration;

use chat_loadbench::bench::{
    ConcurrencyRunner, Driver, MemorySink, MockChatServer, MockServerConfig, Reporter,
};
use chat_loadbench::config::{BenchConfig, Mode, ReportFormat};
use chat_loadbench::error::BenchError;
use chat_loadbench::invoker::{RequestInvoker, RequestSettings};
use chat_loadbench::prompts::PromptPool;
use chat_loadbench::transcript::TranscriptWriter;

// ==================================================================================================
// Test Helpers
// ==================================================================================================

async fn start_server(config: MockServerConfig) -> MockChatServer {
    let mut server = MockChatServer::new(config);
    server.start().await.expect("mock server should start");
    server
}

fn invoker_for(server: &MockChatServer, mode: Mode, timeout: Duration) -> RequestInvoker {
    let config = BenchConfig {
        endpoint: server.endpoint(),
        mode,
        timeout,
        ..Default::default()
    };
    RequestInvoker::new(RequestSettings::from_config(&config).unwrap()).unwrap()
}

fn single_prompt() -> PromptPool {
    PromptPool::new(vec!["Explain TCP slow start.".to_string()]).unwrap()
}

// ==================================================================================================
// Scenarios
// ==================================================================================================

#[tokio::test]
async fn test_buffered_single_request() {
    let server = start_server(MockServerConfig {
        latency_ms: 100,
        total_tokens: 42,
        ..Default::default()
    })
    .await;

    let runner = ConcurrencyRunner::new(
        Arc::new(invoker_for(&server, Mode::Buffered, Duration::from_secs(10))),
        single_prompt(),
    );
    let report = runner.run_level(1, 1, false).await.unwrap();

    assert_eq!(report.total_requests, 1);
    assert_eq!(report.total_tokens, 42);
    assert!(report.avg_ttfb_secs.is_none());
    // one 100ms call per ~100ms of wall time
    assert!(report.requests_per_sec > 5.0 && report.requests_per_sec <= 10.5);
    assert!(report.avg_latency_secs >= 0.1);
    assert!((report.tokens_per_sec - 42.0 * report.requests_per_sec).abs() < 1e-6);
}

#[tokio::test]
async fn test_streaming_counts_deltas() {
    let server = start_server(MockServerConfig {
        latency_ms: 20,
        chunk_latency_ms: 80,
        fragments: vec!["Hello".to_string(), " world".to_string()],
        ..Default::default()
    })
    .await;

    let invoker = invoker_for(&server, Mode::Streaming, Duration::from_secs(10));
    let summary = invoker.stream("Say hello").await.unwrap();

    assert_eq!(summary.token_count, 2);
    assert_eq!(summary.text, "Hello world");
    assert!(summary.time_to_first_token < summary.total_latency);
    assert!(summary.total_latency - summary.time_to_first_token >= Duration::from_millis(80));

    let runner = ConcurrencyRunner::new(Arc::new(invoker), single_prompt());
    let report = runner.run_level(2, 2, false).await.unwrap();
    assert_eq!(report.total_requests, 4);
    assert_eq!(report.total_tokens, 8);
    assert!(report.avg_ttfb_secs.unwrap() < report.avg_latency_secs);
}

#[tokio::test]
async fn test_zero_concurrency_or_repetitions_is_nan() {
    let server = start_server(MockServerConfig::default()).await;
    let runner = ConcurrencyRunner::new(
        Arc::new(invoker_for(&server, Mode::Streaming, Duration::from_secs(5))),
        PromptPool::long_form(),
    );

    for (concurrency, repetitions) in [(0, 3), (5, 0)] {
        let report = runner.run_level(concurrency, repetitions, false).await.unwrap();
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.total_tokens, 0);
        assert!(report.requests_per_sec.is_nan());
        assert!(report.tokens_per_sec.is_nan());
        assert!(report.avg_latency_secs.is_nan());
    }
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn test_timeout_aborts_level_without_report() {
    let server = start_server(MockServerConfig {
        latency_ms: 5,
        stall_marker: Some("stall".to_string()),
        stall_ms: 3_000,
        ..Default::default()
    })
    .await;

    let pool = PromptPool::new(vec![
        "one".to_string(),
        "two".to_string(),
        "stall here".to_string(),
        "four".to_string(),
        "five".to_string(),
    ])
    .unwrap();
    let runner = ConcurrencyRunner::new(
        Arc::new(invoker_for(&server, Mode::Buffered, Duration::from_millis(500))),
        pool,
    );

    let err = runner.run_level(5, 3, false).await.unwrap_err();
    assert!(matches!(err, BenchError::Timeout(_)));
    // the level stopped after its first round
    assert_eq!(server.request_count(), 5);
}

#[tokio::test]
async fn test_malformed_lines_and_transcript() {
    let server = start_server(MockServerConfig {
        latency_ms: 5,
        chunk_latency_ms: 1,
        keepalive: true,
        ..Default::default()
    })
    .await;

    let sample = std::env::temp_dir().join(format!("sample-{}.txt", uuid::Uuid::new_v4()));
    let writer = Arc::new(TranscriptWriter::new(&sample));
    let invoker = invoker_for(&server, Mode::Streaming, Duration::from_secs(10))
        .with_transcript(writer.clone());

    let memory = MemorySink::new();
    let reporter = Reporter::new(ReportFormat::Text).with_sink(memory.clone());
    let runner = ConcurrencyRunner::new(Arc::new(invoker), PromptPool::short_form());
    let mut driver = Driver::new(runner, reporter, vec![2, 1], 1);

    let summary = driver.run().await;
    assert!(summary.failed_levels.is_empty());
    // five fragments per call; the keep-alive line is skipped
    assert_eq!(summary.reports[0].total_tokens, 10);
    assert_eq!(summary.reports[1].total_tokens, 5);

    let transcript = std::fs::read_to_string(&sample).unwrap();
    assert_eq!(
        transcript,
        "=== PROMPT ===\nWhat is the capital of Australia?\n\n\
         === RESPONSE ===\nThe quick brown fox jumps\n"
    );

    let report_text = memory.contents();
    assert!(report_text.contains("-> Concurrency: 2 requests"));
    assert!(report_text.contains("Total tokens              : 5\n"));

    std::fs::remove_file(&sample).ok();
}

#[tokio::test]
async fn test_json_report_lines() {
    let server = start_server(MockServerConfig {
        latency_ms: 2,
        ..Default::default()
    })
    .await;

    let memory = MemorySink::new();
    let reporter = Reporter::new(ReportFormat::Json).with_sink(memory.clone());
    let runner = ConcurrencyRunner::new(
        Arc::new(invoker_for(&server, Mode::Buffered, Duration::from_secs(5))),
        PromptPool::long_form(),
    );
    let mut driver = Driver::new(runner, reporter, vec![1, 3], 2);
    driver.run().await;

    let lines: Vec<serde_json::Value> = memory
        .contents()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["run"]["mode"], "buffered");
    assert_eq!(lines[1]["concurrency"], 1);
    assert_eq!(lines[1]["total_requests"], 2);
    assert_eq!(lines[2]["concurrency"], 3);
    assert_eq!(lines[2]["total_tokens"], 6 * 42);
    assert!(lines[2]["avg_ttfb_secs"].is_null());
}
