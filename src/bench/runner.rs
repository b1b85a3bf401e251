//! Benchmark runner with per-round concurrency fan-out.

use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

use super::metrics::{LevelReport, LevelStatistics, RoundTotals};
use crate::error::{BenchError, Result};
use crate::invoker::{RequestInvoker, RequestSettings};
use crate::prompts::PromptPool;

/// Runs rounds of parallel requests for one concurrency level at a time
pub struct ConcurrencyRunner {
    invoker: Arc<RequestInvoker>,
    pool: PromptPool,
}

impl ConcurrencyRunner {
    pub fn new(invoker: Arc<RequestInvoker>, pool: PromptPool) -> Self {
        Self { invoker, pool }
    }

    pub fn pool(&self) -> &PromptPool {
        &self.pool
    }

    pub fn settings(&self) -> &RequestSettings {
        self.invoker.settings()
    }

    /// Run `repetitions` sequential rounds of `concurrency` parallel calls.
    ///
    /// The first failed call aborts the level; nothing is finalized for it.
    /// `capture_sample` flags slot 0 of the first round for the transcript.
    pub async fn run_level(
        &self,
        concurrency: usize,
        repetitions: usize,
        capture_sample: bool,
    ) -> Result<LevelReport> {
        let streaming = self.settings().mode.is_streaming();
        let mut stats = LevelStatistics::new(concurrency, repetitions, streaming);

        for rep in 0..repetitions {
            let round = self
                .run_round(concurrency, capture_sample && rep == 0)
                .await?;

            tracing::debug!(
                concurrency,
                round = rep + 1,
                requests = round.requests,
                tokens = round.tokens,
                wall_ms = round.wall_time.as_millis() as u64,
                "Round complete"
            );
            stats.record_round(&round);
        }

        Ok(stats.finalize())
    }

    /// Launch every slot before awaiting any, then join them all.
    pub async fn run_round(&self, concurrency: usize, capture_first: bool) -> Result<RoundTotals> {
        let mut tasks = JoinSet::new();

        let start = Instant::now();
        for slot in 0..concurrency {
            let invoker = Arc::clone(&self.invoker);
            let prompt = self.pool.get(slot).to_string();
            let capture = capture_first && slot == 0;

            tasks.spawn(async move { invoker.invoke(&prompt, capture).await });
        }

        let mut totals = RoundTotals::default();
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    tasks.abort_all();
                    tracing::error!(concurrency, error = %e, "Request failed, aborting round");
                    return Err(e);
                }
                Err(e) => {
                    tasks.abort_all();
                    tracing::error!(concurrency, error = %e, "Request task failed, aborting round");
                    return Err(BenchError::Task(e));
                }
            };
            totals.record(&outcome);
        }
        totals.wall_time = start.elapsed();

        Ok(totals)
    }
}
