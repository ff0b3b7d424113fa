use anyhow::Context;
use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error};
use warp::Filter;

use crate::prober::{AttemptOutcome, OutcomeKind};
use crate::runner::AttemptObserver;

const LATENCY_BUCKETS_MS: [f64; 14] = [
    0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 250.0, 500.0, 1000.0,
];

/// Prometheus view of one run, labelled with the probed target.
#[derive(Clone)]
pub struct ProbeMetrics {
    registry: Registry,
    attempts: IntCounterVec,
    latency_current: Gauge,
    latency_hist: Histogram,
}

impl ProbeMetrics {
    pub fn new(target: &str) -> prometheus::Result<Self> {
        let registry = Registry::new_custom(
            Some("tcp_probe".to_string()),
            Some([("target".to_string(), target.to_string())].into_iter().collect()),
        )?;

        let attempts = IntCounterVec::new(
            Opts::new("attempts_total", "Connect attempts by outcome"),
            &["outcome"],
        )?;
        let latency_current = Gauge::with_opts(Opts::new(
            "latency_milliseconds_current",
            "Latency of the last successful connect in milliseconds",
        ))?;
        let latency_hist = Histogram::with_opts(
            HistogramOpts::new("latency_milliseconds", "Successful connect latency in milliseconds")
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
        )?;

        registry.register(Box::new(attempts.clone()))?;
        registry.register(Box::new(latency_current.clone()))?;
        registry.register(Box::new(latency_hist.clone()))?;

        // every outcome series exists from the start, even at zero
        for kind in OutcomeKind::ALL {
            attempts.with_label_values(&[kind.as_str()]);
        }

        Ok(Self {
            registry,
            attempts,
            latency_current,
            latency_hist,
        })
    }

    pub fn observe(&self, outcome: &AttemptOutcome) {
        self.attempts
            .with_label_values(&[outcome.kind().as_str()])
            .inc();
        if let Some(latency_ms) = outcome.outcome.latency_ms() {
            self.latency_current.set(latency_ms);
            self.latency_hist.observe(latency_ms);
        }
    }

    pub fn encode(&self) -> prometheus::Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

impl AttemptObserver for ProbeMetrics {
    fn outcome_recorded(&mut self, outcome: &AttemptOutcome) {
        self.observe(outcome);
    }
}

/// Binds the `/metrics` listener before the run starts, so a busy or
/// forbidden address fails the command instead of a detached task.
pub async fn bind_metrics(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", addr))
}

pub async fn serve_metrics(listener: TcpListener, metrics: ProbeMetrics) {
    let metrics_route = warp::path!("metrics").map(move || match metrics.encode() {
        Ok(buf) => warp::http::Response::builder()
            .header("Content-Type", TextEncoder::new().format_type())
            .body(buf),
        Err(e) => {
            error!("failed to encode metrics: {}", e);
            warp::http::Response::builder()
                .status(500)
                .body(Vec::new())
        }
    });

    match listener.local_addr() {
        Ok(addr) => debug!("serving metrics on {}", addr),
        Err(e) => debug!("serving metrics on unknown address: {}", e),
    }
    warp::serve(metrics_route).incoming(listener).run().await;
}
