use serde::Serialize;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ProbeConfig;
use crate::error::ConfigError;
use crate::prober::{AttemptOutcome, Prober, TcpConnectProber, Target};
use crate::summary::RunSummary;

/// Receives per-attempt events while a run is in progress.
///
/// `attempt_started` and `attempt_finished` bracket exactly one probe call,
/// including one abandoned by cancellation. `outcome_recorded` follows only
/// for attempts that produced an outcome.
pub trait AttemptObserver {
    fn attempt_started(&mut self, _attempt: u32, _total: u32) {}
    fn attempt_finished(&mut self, _attempt: u32) {}
    fn outcome_recorded(&mut self, _outcome: &AttemptOutcome) {}
}

impl AttemptObserver for () {}

impl<T: AttemptObserver> AttemptObserver for Option<T> {
    fn attempt_started(&mut self, attempt: u32, total: u32) {
        if let Some(inner) = self {
            inner.attempt_started(attempt, total);
        }
    }

    fn attempt_finished(&mut self, attempt: u32) {
        if let Some(inner) = self {
            inner.attempt_finished(attempt);
        }
    }

    fn outcome_recorded(&mut self, outcome: &AttemptOutcome) {
        if let Some(inner) = self {
            inner.outcome_recorded(outcome);
        }
    }
}

impl<A: AttemptObserver, B: AttemptObserver> AttemptObserver for (A, B) {
    fn attempt_started(&mut self, attempt: u32, total: u32) {
        self.0.attempt_started(attempt, total);
        self.1.attempt_started(attempt, total);
    }

    fn attempt_finished(&mut self, attempt: u32) {
        self.0.attempt_finished(attempt);
        self.1.attempt_finished(attempt);
    }

    fn outcome_recorded(&mut self, outcome: &AttemptOutcome) {
        self.0.outcome_recorded(outcome);
        self.1.outcome_recorded(outcome);
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub target: Target,
    pub config: ProbeConfig,
    pub status: RunStatus,
    pub outcomes: Vec<AttemptOutcome>,
    pub summary: RunSummary,
}

/// Drives a fixed number of sequential attempts through a [`Prober`].
pub struct Runner<P = TcpConnectProber> {
    config: ProbeConfig,
    timeout: Duration,
    interval: Duration,
    prober: P,
}

impl Runner<TcpConnectProber> {
    pub fn new(config: ProbeConfig) -> Result<Self, ConfigError> {
        Self::with_prober(config, TcpConnectProber)
    }
}

impl<P: Prober> Runner<P> {
    pub fn with_prober(config: ProbeConfig, prober: P) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            timeout: config.timeout(),
            interval: config.interval(),
            config,
            prober,
        })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Runs every attempt, or as many as complete before `cancel` fires.
    ///
    /// An attempt in flight when the token is cancelled is dropped without
    /// being recorded; the summary then covers the recorded attempts only.
    pub async fn run<O>(&self, target: &Target, observer: &mut O, cancel: &CancellationToken) -> RunReport
    where
        O: AttemptObserver + ?Sized,
    {
        let total = self.config.attempts;
        // the attempt count is user input; grow past this instead of reserving it all
        let mut outcomes: Vec<AttemptOutcome> = Vec::with_capacity(total.min(1024) as usize);
        let mut status = RunStatus::Completed;

        info!(
            "probing {} with {} attempts, timeout {:?}, interval {:?}",
            target, total, self.timeout, self.interval
        );

        let start = Instant::now();
        for attempt in 1..=total {
            if cancel.is_cancelled() {
                status = RunStatus::Cancelled;
                break;
            }

            observer.attempt_started(attempt, total);
            let probed = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                outcome = self.prober.probe(target.addr, self.timeout) => Some(outcome),
            };
            observer.attempt_finished(attempt);

            let Some(outcome) = probed else {
                debug!("attempt {}/{} abandoned on cancellation", attempt, total);
                status = RunStatus::Cancelled;
                break;
            };

            debug!("attempt {}/{}: {:?}", attempt, total, outcome);
            outcomes.push(AttemptOutcome::new(attempt, outcome));
            observer.outcome_recorded(&outcomes[outcomes.len() - 1]);

            if attempt < total && !self.interval.is_zero() {
                let interrupted = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => true,
                    _ = sleep(self.interval) => false,
                };
                if interrupted {
                    status = RunStatus::Cancelled;
                    break;
                }
            }
        }
        let duration = start.elapsed();

        let summary = RunSummary::from_outcomes(&outcomes, duration);
        info!(
            "run {:?}: {}/{} successful in {:.2}s",
            status, summary.success_count, summary.total_attempts, summary.duration_seconds
        );

        RunReport {
            target: target.clone(),
            config: self.config,
            status,
            outcomes,
            summary,
        }
    }
}
