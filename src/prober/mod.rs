use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

pub mod tcp_connect;

pub use tcp_connect::TcpConnectProber;

/// The host the user asked for and the address it resolved to before the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub host: String,
    pub addr: SocketAddr,
}

impl Target {
    pub fn new(host: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            host: host.into(),
            addr,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.host, self.addr)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Success,
    Timeout,
    Refused,
    #[serde(rename = "error")]
    OtherError,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 4] = [
        OutcomeKind::Success,
        OutcomeKind::Timeout,
        OutcomeKind::Refused,
        OutcomeKind::OtherError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Timeout => "timeout",
            OutcomeKind::Refused => "refused",
            OutcomeKind::OtherError => "error",
        }
    }
}

/// Result of a single connect attempt.
///
/// Latency only exists on success and a detail string only on `Error`, so the
/// variants carry them instead of optional fields.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeOutcome {
    Success { latency_ms: f64 },
    Timeout,
    Refused,
    Error { detail: String },
}

impl ProbeOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ProbeOutcome::Success { .. } => OutcomeKind::Success,
            ProbeOutcome::Timeout => OutcomeKind::Timeout,
            ProbeOutcome::Refused => OutcomeKind::Refused,
            ProbeOutcome::Error { .. } => OutcomeKind::OtherError,
        }
    }

    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            ProbeOutcome::Success { latency_ms } => Some(*latency_ms),
            _ => None,
        }
    }
}

/// One recorded attempt. The index is assigned by the runner, 1-based.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttemptOutcome {
    pub attempt: u32,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

impl AttemptOutcome {
    pub fn new(attempt: u32, outcome: ProbeOutcome) -> Self {
        Self { attempt, outcome }
    }

    pub fn kind(&self) -> OutcomeKind {
        self.outcome.kind()
    }
}

/// A single bounded connection attempt against an already resolved address.
///
/// Expected network failures are folded into the returned outcome; a prober
/// never fails the run.
pub trait Prober {
    fn probe(
        &self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> impl std::future::Future<Output = ProbeOutcome>;
}
