//! Sequential loop over concurrency levels.

use chrono::Utc;

use super::metrics::LevelReport;
use super::report::{Reporter, RunHeader};
use super::runner::ConcurrencyRunner;

/// Outcome of a whole run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Reports of levels that completed, in run order
    pub reports: Vec<LevelReport>,
    /// Levels aborted by a failed request
    pub failed_levels: Vec<usize>,
}

pub struct Driver {
    runner: ConcurrencyRunner,
    reporter: Reporter,
    levels: Vec<usize>,
    repetitions: usize,
}

impl Driver {
    pub fn new(
        runner: ConcurrencyRunner,
        reporter: Reporter,
        levels: Vec<usize>,
        repetitions: usize,
    ) -> Self {
        Self {
            runner,
            reporter,
            levels,
            repetitions,
        }
    }

    /// Index of the level whose first round captures the sample transcript.
    ///
    /// Only streaming runs capture; the first occurrence of the smallest level wins.
    pub fn capture_index(&self) -> Option<usize> {
        if !self.runner.settings().mode.is_streaming() {
            return None;
        }
        self.levels
            .iter()
            .enumerate()
            .min_by_key(|(_, level)| **level)
            .map(|(index, _)| index)
    }

    /// Run every level in order; an aborted level does not stop the run
    pub async fn run(&mut self) -> RunSummary {
        let settings = self.runner.settings();
        let header = RunHeader {
            started_at: Utc::now(),
            endpoint: settings.endpoint.to_string(),
            mode: settings.mode,
            levels: self.levels.clone(),
            repetitions: self.repetitions,
        };
        self.reporter.run_header(&header);

        tracing::info!(
            endpoint = %header.endpoint,
            mode = %header.mode,
            levels = ?header.levels,
            repetitions = self.repetitions,
            prompts = self.runner.pool().len(),
            "Starting benchmark"
        );

        let capture_index = self.capture_index();
        let mut summary = RunSummary::default();

        for (index, &concurrency) in self.levels.iter().enumerate() {
            self.reporter.level_header(concurrency);

            let result = self
                .runner
                .run_level(concurrency, self.repetitions, capture_index == Some(index))
                .await;

            match result {
                Ok(report) => {
                    tracing::info!(
                        concurrency,
                        requests = report.total_requests,
                        tokens = report.total_tokens,
                        rps = report.requests_per_sec,
                        "Level complete"
                    );
                    self.reporter.report_level(&report);
                    summary.reports.push(report);
                }
                Err(e) => {
                    tracing::warn!(concurrency, error = %e, "Level aborted");
                    self.reporter.level_aborted(concurrency, &e);
                    summary.failed_levels.push(concurrency);
                }
            }
        }

        summary
    }
}
