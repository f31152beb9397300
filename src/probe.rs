//! Single-shot TCP reachability check, independent of any database protocol.

use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::error::OpsError;
use crate::report::Record;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Connected { elapsed: Duration },
    TimedOut { after: Duration },
    Refused { message: String },
    Failed { message: String },
}

impl ProbeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Connected { .. } => "connected",
            ProbeOutcome::TimedOut { .. } => "timeout",
            ProbeOutcome::Refused { .. } => "refused",
            ProbeOutcome::Failed { .. } => "error",
        }
    }

    pub fn record(&self, target: &str, elapsed: Duration) -> Record {
        let detail = match self {
            ProbeOutcome::Refused { message } | ProbeOutcome::Failed { message } => {
                Some(message.clone())
            }
            _ => None,
        };
        Record::Probe {
            target: target.to_string(),
            outcome: self.label(),
            elapsed_ms: elapsed.as_millis() as u64,
            detail,
        }
    }

    /// Anything but `Connected` becomes an error carrying the probe target.
    pub fn into_result(self, host: &str, target: &str) -> Result<Duration, OpsError> {
        match self {
            ProbeOutcome::Connected { elapsed } => Ok(elapsed),
            ProbeOutcome::TimedOut { after } => Err(OpsError::Timeout {
                target: target.to_string(),
                after,
            }),
            ProbeOutcome::Refused { message } => Err(OpsError::Connection {
                host: host.to_string(),
                code: "ECONNREFUSED".to_string(),
                message,
            }),
            ProbeOutcome::Failed { message } => Err(OpsError::Connection {
                host: host.to_string(),
                code: "EPROBE".to_string(),
                message,
            }),
        }
    }
}

/// Open one TCP connection to `host:port` (name resolution included) within
/// `limit`, then drop it. No retries.
pub async fn probe(host: &str, port: u16, limit: Duration) -> ProbeOutcome {
    let target = format!("{host}:{port}");
    debug!(target = %target, timeout_ms = limit.as_millis() as u64, "probing");
    let outcome = probe_with(TcpStream::connect((host, port)), limit).await;
    match &outcome {
        ProbeOutcome::Connected { elapsed } => {
            info!(target = %target, elapsed_ms = elapsed.as_millis() as u64, "reachable")
        }
        other => warn!(target = %target, outcome = other.label(), "not reachable"),
    }
    outcome
}

/// Drive an arbitrary connect future under the same timeout rules.
pub async fn probe_with<F, T>(connect: F, limit: Duration) -> ProbeOutcome
where
    F: Future<Output = io::Result<T>>,
{
    let started = Instant::now();
    match timeout(limit, connect).await {
        Ok(Ok(_stream)) => ProbeOutcome::Connected {
            elapsed: started.elapsed(),
        },
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => ProbeOutcome::Refused {
            message: e.to_string(),
        },
        Ok(Err(e)) => ProbeOutcome::Failed {
            message: e.to_string(),
        },
        Err(_) => ProbeOutcome::TimedOut {
            after: started.elapsed(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_a_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let outcome = probe("127.0.0.1", port, Duration::from_secs(5)).await;
        assert_eq!(outcome.label(), "connected");
    }

    #[tokio::test]
    async fn closed_port_is_refused_not_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let outcome = probe("127.0.0.1", port, Duration::from_secs(5)).await;
        assert!(matches!(outcome, ProbeOutcome::Refused { .. }), "{outcome:?}");
        let err = outcome.into_result("127.0.0.1", "127.0.0.1").unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out_at_the_bound() {
        let limit = Duration::from_secs(5);
        let outcome = probe_with(std::future::pending::<io::Result<()>>(), limit).await;
        match outcome {
            ProbeOutcome::TimedOut { after } => {
                assert!(after >= limit);
                assert!(after < limit + Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_io_errors_are_reported_as_error() {
        let failing = async {
            Err::<(), _>(io::Error::new(io::ErrorKind::AddrNotAvailable, "no route"))
        };
        let outcome = probe_with(failing, Duration::from_secs(1)).await;
        assert_eq!(outcome.label(), "error");
        let rec = outcome.record("10.0.0.1:3306", Duration::from_millis(3));
        assert!(matches!(rec, Record::Probe { detail: Some(_), .. }));
    }
}
