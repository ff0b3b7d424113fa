use serde::Serialize;
use std::time::Duration;

use crate::prober::AttemptOutcome;

/// Aggregate view of a run, computed once from the recorded attempts.
///
/// Latency figures only cover successful attempts and are `None` when there
/// were none.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    pub total_attempts: u32,
    pub success_count: u32,
    pub duration_seconds: f64,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub mean_latency_ms: Option<f64>,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[AttemptOutcome], duration: Duration) -> Self {
        let latencies: Vec<f64> = outcomes
            .iter()
            .filter_map(|o| o.outcome.latency_ms())
            .collect();

        let (min, max, mean) = if latencies.is_empty() {
            (None, None, None)
        } else {
            let min = latencies.iter().copied().fold(f64::INFINITY, f64::min);
            let max = latencies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
            (Some(min), Some(max), Some(mean))
        };

        Self {
            total_attempts: outcomes.len() as u32,
            success_count: latencies.len() as u32,
            duration_seconds: duration.as_secs_f64(),
            min_latency_ms: min,
            max_latency_ms: max,
            mean_latency_ms: mean,
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.total_attempts - self.success_count
    }

    /// Share of successful attempts in percent, 0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_attempts as f64 * 100.0
    }
}
