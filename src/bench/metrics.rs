//! Per-level statistics folded from completed rounds.

use serde::Serialize;
use std::time::Duration;

use crate::invoker::RequestOutcome;

/// Sums for one parallel batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundTotals {
    /// Wall-clock time of the whole batch, not the sum of latencies
    pub wall_time: Duration,
    pub requests: u64,
    pub tokens: u64,
    pub latency_sum: Duration,
    pub ttfb_sum: Duration,
}

impl RoundTotals {
    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.requests += 1;
        self.tokens += outcome.token_count;
        self.latency_sum += outcome.total_latency;
        if let Some(ttfb) = outcome.time_to_first_token {
            self.ttfb_sum += ttfb;
        }
    }
}

/// Running totals for one concurrency level.
///
/// Only the coordinating task mutates this, once per completed round.
#[derive(Debug, Clone)]
pub struct LevelStatistics {
    pub concurrency: usize,
    pub repetitions: usize,
    pub streaming: bool,
    pub rounds_completed: usize,
    pub total_wall_time: Duration,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub latency_sum: Duration,
    pub ttfb_sum: Duration,
}

impl LevelStatistics {
    pub fn new(concurrency: usize, repetitions: usize, streaming: bool) -> Self {
        Self {
            concurrency,
            repetitions,
            streaming,
            rounds_completed: 0,
            total_wall_time: Duration::ZERO,
            total_requests: 0,
            total_tokens: 0,
            latency_sum: Duration::ZERO,
            ttfb_sum: Duration::ZERO,
        }
    }

    pub fn record_round(&mut self, round: &RoundTotals) {
        self.rounds_completed += 1;
        self.total_wall_time += round.wall_time;
        self.total_requests += round.requests;
        self.total_tokens += round.tokens;
        self.latency_sum += round.latency_sum;
        self.ttfb_sum += round.ttfb_sum;
    }

    /// Derive rates. Ratios over zero requests (or zero wall time) are NaN.
    pub fn finalize(&self) -> LevelReport {
        let wall_secs = self.total_wall_time.as_secs_f64();
        let requests = self.total_requests as f64;
        let measurable = self.total_requests > 0 && wall_secs > 0.0;

        let ratio = |numerator: f64, denominator: f64| {
            if measurable {
                numerator / denominator
            } else {
                f64::NAN
            }
        };

        let avg_wall_time_secs = if self.rounds_completed > 0 {
            wall_secs / self.rounds_completed as f64
        } else {
            f64::NAN
        };

        LevelReport {
            concurrency: self.concurrency,
            repetitions: self.repetitions,
            streaming: self.streaming,
            total_requests: self.total_requests,
            total_tokens: self.total_tokens,
            total_wall_time_secs: wall_secs,
            requests_per_sec: ratio(requests, wall_secs),
            tokens_per_sec: ratio(self.total_tokens as f64, wall_secs),
            avg_latency_secs: ratio(self.latency_sum.as_secs_f64(), requests),
            avg_ttfb_secs: self
                .streaming
                .then(|| ratio(self.ttfb_sum.as_secs_f64(), requests)),
            avg_wall_time_secs,
        }
    }
}

/// Finalized figures for one concurrency level
#[derive(Debug, Clone, Serialize)]
pub struct LevelReport {
    pub concurrency: usize,
    pub repetitions: usize,
    pub streaming: bool,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub total_wall_time_secs: f64,
    pub requests_per_sec: f64,
    pub tokens_per_sec: f64,
    pub avg_latency_secs: f64,
    /// Present in streaming mode only
    pub avg_ttfb_secs: Option<f64>,
    pub avg_wall_time_secs: f64,
}
