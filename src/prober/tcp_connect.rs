use std::io;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, trace};

use super::{ProbeOutcome, Prober};

/// Plain TCP handshake probe. Nothing is written to the connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectProber;

impl Prober for TcpConnectProber {
    async fn probe(&self, addr: SocketAddr, limit: Duration) -> ProbeOutcome {
        probe_tcp(addr, limit).await
    }
}

pub async fn probe_tcp(addr: SocketAddr, limit: Duration) -> ProbeOutcome {
    let start = Instant::now();
    let conn_fut = TcpStream::connect(addr);
    let result = timeout(limit, conn_fut).await;
    let elapsed = start.elapsed();

    match result {
        Ok(Ok(conn)) => {
            drop(conn);
            if elapsed > limit {
                // completed, but only observed after the deadline
                debug!("tcp connect {} finished after deadline: {:?}", addr, elapsed);
                ProbeOutcome::Timeout
            } else {
                trace!("tcp connect {} success: {:?}", addr, elapsed);
                ProbeOutcome::Success {
                    latency_ms: elapsed.as_secs_f64() * 1000.0,
                }
            }
        }
        Ok(Err(e)) => {
            debug!("tcp connect {} failed after {:?}: {}", addr, elapsed, e);
            classify_error(&e, elapsed, limit)
        }
        Err(_) => {
            debug!("tcp connect {} timed out after {:?}", addr, elapsed);
            ProbeOutcome::Timeout
        }
    }
}

/// Maps a failed connect to an outcome.
///
/// The OS error kind decides. A `TimedOut` reported by the OS only counts as
/// `Timeout` once our own bound has passed too, so a timeout is never
/// reported early.
pub fn classify_error(err: &io::Error, elapsed: Duration, limit: Duration) -> ProbeOutcome {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => ProbeOutcome::Refused,
        io::ErrorKind::TimedOut if elapsed >= limit => ProbeOutcome::Timeout,
        io::ErrorKind::TimedOut => ProbeOutcome::Error {
            detail: format!("timed out by the OS before the {:?} limit: {}", limit, err),
        },
        _ => ProbeOutcome::Error {
            detail: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prober::OutcomeKind;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn closed_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn test_success_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let limit = Duration::from_secs(2);

        let outcome = probe_tcp(addr, limit).await;
        match outcome {
            ProbeOutcome::Success { latency_ms } => {
                assert!(latency_ms >= 0.0);
                assert!(latency_ms <= limit.as_secs_f64() * 1000.0);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_is_closed_after_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let outcome = probe_tcp(addr, Duration::from_secs(2)).await;
        assert_eq!(outcome.kind(), OutcomeKind::Success);

        let (mut accepted, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 8];
        let read = tokio::time::timeout(Duration::from_secs(2), accepted.read(&mut buf))
            .await
            .expect("peer should see the close")
            .unwrap_or(0);
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn test_closed_port_is_always_refused() {
        let addr = closed_port().await;
        for _ in 0..5 {
            let outcome = probe_tcp(addr, Duration::from_secs(1)).await;
            assert_eq!(outcome.kind(), OutcomeKind::Refused);
        }
    }

    #[tokio::test]
    async fn test_repeated_refusals_do_not_exhaust_sockets() {
        let addr = closed_port().await;
        for _ in 0..500 {
            let outcome = probe_tcp(addr, Duration::from_secs(1)).await;
            assert_eq!(outcome.kind(), OutcomeKind::Refused);
        }
    }

    #[test]
    fn test_classify_error_table() {
        let limit = Duration::from_secs(1);
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_error(&refused, Duration::ZERO, limit), ProbeOutcome::Refused);

        let late = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(classify_error(&late, limit, limit), ProbeOutcome::Timeout);

        let early = io::Error::from(io::ErrorKind::TimedOut);
        let outcome = classify_error(&early, Duration::from_millis(10), limit);
        assert_eq!(outcome.kind(), OutcomeKind::OtherError);

        let unreachable = io::Error::other("network is unreachable");
        let outcome = classify_error(&unreachable, Duration::ZERO, limit);
        assert_eq!(
            outcome,
            ProbeOutcome::Error {
                detail: "network is unreachable".into()
            }
        );
    }

    // Needs a network where 10.255.255.1 is black-holed rather than unreachable.
    #[tokio::test]
    #[ignore]
    async fn test_blackholed_address_times_out() {
        let addr: SocketAddr = "10.255.255.1:80".parse().unwrap();
        let limit = Duration::from_secs(1);
        let start = std::time::Instant::now();
        let outcome = probe_tcp(addr, limit).await;
        let elapsed = start.elapsed();
        assert_eq!(outcome, ProbeOutcome::Timeout);
        assert!(elapsed >= limit);
        assert!(elapsed < limit + Duration::from_millis(500));
    }
}
