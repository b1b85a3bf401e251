use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use chat_loadbench::bench::{
    ConcurrencyRunner, Driver, FileSink, MockChatServer, MockServerConfig, Reporter, StdoutSink,
};
use chat_loadbench::config::{BenchConfig, CliArgs};
use chat_loadbench::invoker::{RequestInvoker, RequestSettings};
use chat_loadbench::prompts::PromptPool;
use chat_loadbench::transcript::TranscriptWriter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    init_tracing(&args.log_level, args.log_json);

    let mut config = BenchConfig::from_args(&args).context("Invalid configuration")?;

    // Keep the mock server alive until the run ends
    let _mock_server = if config.standalone {
        let mut server = MockChatServer::new(MockServerConfig::default());
        server
            .start()
            .await
            .context("Failed to start mock chat server")?;
        tracing::info!(endpoint = %server.endpoint(), "Standalone mode: benchmarking mock server");
        config.endpoint = server.endpoint();
        Some(server)
    } else {
        None
    };

    let pool = match &config.prompt_file {
        Some(path) => PromptPool::from_file(path)
            .with_context(|| format!("Failed to load prompts from {}", path.display()))?,
        None => PromptPool::for_set(config.prompt_set),
    };

    let settings = RequestSettings::from_config(&config)?;
    let mut invoker = RequestInvoker::new(settings)?;
    if config.mode.is_streaming() {
        if let Some(path) = &config.sample_file {
            invoker = invoker.with_transcript(Arc::new(TranscriptWriter::new(path)));
        }
    }

    let mut reporter = Reporter::new(config.format).with_sink(StdoutSink);
    if let Some(path) = &config.log_file {
        let sink = FileSink::open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        reporter.add_sink(Box::new(sink));
    }

    let runner = ConcurrencyRunner::new(Arc::new(invoker), pool);
    let mut driver = Driver::new(runner, reporter, config.levels.clone(), config.repetitions);
    let summary = driver.run().await;

    if summary.failed_levels.is_empty() {
        tracing::info!(levels = summary.reports.len(), "Benchmark finished");
    } else {
        tracing::warn!(
            completed = summary.reports.len(),
            failed = ?summary.failed_levels,
            "Benchmark finished with aborted levels"
        );
    }

    Ok(())
}

fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
