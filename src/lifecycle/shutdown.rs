//! Ordered shutdown of listener pairs.
//!
//! The encrypted pair is fully stopped before the plaintext pair is touched.
//! Within a pair both endpoints stop concurrently, and a failure on one does
//! not cancel its sibling.
//!
//! Per endpoint:
//! ```text
//! Graceful: drain ──ok──▶ Drained
//!             └──err──▶ abort ──ok──▶ Escalated
//!                          └──err──▶ EmergencyShutdown (fatal)
//! Fast:     abort ──ok──▶ Aborted
//!             └──err──▶ EmergencyShutdown (fatal)
//! ```

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::task::JoinError;

use crate::lifecycle::error::LifecycleError;
use crate::net::endpoint::Transport;
use crate::observability::metrics;

/// Failure to stop a single endpoint.
#[derive(Debug, Error)]
pub enum StopError {
    #[error("drain did not finish within {0:?}")]
    DrainTimedOut(Duration),

    #[error("listener failed while stopping: {0}")]
    Serve(#[source] io::Error),

    #[error("serving task did not exit cleanly: {0}")]
    Join(#[source] JoinError),
}

/// A running endpoint that can be stopped.
pub trait Stoppable: Send {
    /// Address used to identify the endpoint in logs.
    fn address(&self) -> SocketAddr;

    /// Stop accepting and wait for in-flight connections, at most
    /// `deadline` when set.
    fn drain(
        &mut self,
        deadline: Option<Duration>,
    ) -> impl Future<Output = Result<(), StopError>> + Send;

    /// Close immediately, dropping open connections.
    fn abort(&mut self) -> impl Future<Output = Result<(), StopError>> + Send;
}

/// How to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Drain first, escalate to an immediate close on failure.
    Graceful { deadline: Option<Duration> },
    /// Close immediately.
    Fast,
}

/// How an endpoint ended up stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Drained,
    Escalated,
    Aborted,
}

impl StopOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopOutcome::Drained => "drained",
            StopOutcome::Escalated => "escalated",
            StopOutcome::Aborted => "aborted",
        }
    }
}

/// Stop the encrypted endpoints, then the plaintext ones.
///
/// Every endpoint is processed even if an earlier one could not be closed;
/// the first unrecoverable error is returned afterwards. Returns `Ok(true)`
/// otherwise.
pub async fn stop_pairs<S: Stoppable>(
    encrypted: &mut [S],
    plaintext: &mut [S],
    mode: StopMode,
) -> Result<bool, LifecycleError> {
    let mut first_error = None;

    for (transport, listeners) in [
        (Transport::Encrypted, encrypted),
        (Transport::Plaintext, plaintext),
    ] {
        if listeners.is_empty() {
            continue;
        }
        if let Err(e) = stop_pair(transport, listeners, mode).await {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(true),
    }
}

/// Stop every endpoint of one pair concurrently.
pub async fn stop_pair<S: Stoppable>(
    transport: Transport,
    listeners: &mut [S],
    mode: StopMode,
) -> Result<Vec<StopOutcome>, LifecycleError> {
    let results = join_all(
        listeners
            .iter_mut()
            .map(|listener| stop_listener(transport, listener, mode)),
    )
    .await;

    let mut outcomes = Vec::with_capacity(results.len());
    let mut first_error = None;
    for result in results {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(outcomes),
    }
}

async fn stop_listener<S: Stoppable>(
    transport: Transport,
    listener: &mut S,
    mode: StopMode,
) -> Result<StopOutcome, LifecycleError> {
    let address = listener.address();

    let outcome = match mode {
        StopMode::Fast => StopOutcome::Aborted,
        StopMode::Graceful { deadline } => match listener.drain(deadline).await {
            Ok(()) => {
                tracing::info!(
                    transport = transport.as_str(),
                    address = %address,
                    "{transport} server terminated gracefully"
                );
                metrics::record_listener_stopped(transport, StopOutcome::Drained.as_str());
                return Ok(StopOutcome::Drained);
            }
            Err(error) => {
                tracing::warn!(
                    transport = transport.as_str(),
                    address = %address,
                    error = %error,
                    "{transport} shutdown failed, forcing close"
                );
                StopOutcome::Escalated
            }
        },
    };

    if let Err(source) = listener.abort().await {
        tracing::error!(
            transport = transport.as_str(),
            address = %address,
            error = %source,
            "{transport} emergency shutdown failed"
        );
        metrics::record_listener_stopped(transport, "failed");
        return Err(LifecycleError::EmergencyShutdown {
            transport,
            address,
            source,
        });
    }

    tracing::info!(
        transport = transport.as_str(),
        address = %address,
        outcome = outcome.as_str(),
        "{transport} server closed"
    );
    metrics::record_listener_stopped(transport, outcome.as_str());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records every call; drain and abort results are scripted.
    struct Recorder {
        name: &'static str,
        log: Log,
        drain_delay: Duration,
        drain_fails: bool,
        abort_fails: bool,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                log: Arc::clone(log),
                drain_delay: Duration::ZERO,
                drain_fails: false,
                abort_fails: false,
            }
        }

        fn push(&self, event: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, event));
        }
    }

    impl Stoppable for Recorder {
        fn address(&self) -> SocketAddr {
            "127.0.0.1:9".parse().unwrap()
        }

        async fn drain(&mut self, _deadline: Option<Duration>) -> Result<(), StopError> {
            self.push("drain-start");
            tokio::time::sleep(self.drain_delay).await;
            self.push("drain-end");
            if self.drain_fails {
                Err(StopError::Serve(io::Error::other("drain failed")))
            } else {
                Ok(())
            }
        }

        async fn abort(&mut self) -> Result<(), StopError> {
            self.push("abort");
            if self.abort_fails {
                Err(StopError::Serve(io::Error::other("abort failed")))
            } else {
                Ok(())
            }
        }
    }

    fn events(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    const GRACEFUL: StopMode = StopMode::Graceful { deadline: None };

    #[tokio::test]
    async fn nothing_to_stop() {
        let mut encrypted: Vec<Recorder> = Vec::new();
        let mut plaintext: Vec<Recorder> = Vec::new();
        assert!(stop_pairs(&mut encrypted, &mut plaintext, GRACEFUL).await.unwrap());
    }

    #[tokio::test]
    async fn encrypted_pair_finishes_before_plaintext_starts() {
        let log = Log::default();
        let mut encrypted = vec![Recorder::new("https-v4", &log), Recorder::new("https-v6", &log)];
        for listener in &mut encrypted {
            listener.drain_delay = Duration::from_millis(50);
        }
        let mut plaintext = vec![Recorder::new("http-v4", &log), Recorder::new("http-v6", &log)];

        assert!(stop_pairs(&mut encrypted, &mut plaintext, GRACEFUL).await.unwrap());

        let events = events(&log);
        let last_https = events.iter().rposition(|e| e.starts_with("https")).unwrap();
        let first_http = events.iter().position(|e| e.starts_with("http-")).unwrap();
        assert!(last_https < first_http, "{events:?}");
        assert_eq!(events.len(), 8);
        assert!(events.iter().all(|e| !e.ends_with("abort")));
    }

    #[tokio::test]
    async fn fast_mode_never_drains() {
        let log = Log::default();
        let mut encrypted = vec![Recorder::new("https-v4", &log), Recorder::new("https-v6", &log)];
        let mut plaintext = vec![Recorder::new("http-v4", &log), Recorder::new("http-v6", &log)];

        assert!(stop_pairs(&mut encrypted, &mut plaintext, StopMode::Fast).await.unwrap());

        let events = events(&log);
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.ends_with("abort")));
        assert!(events[0].starts_with("https") && events[1].starts_with("https"));
    }

    #[tokio::test]
    async fn failed_drain_escalates_to_abort() {
        let log = Log::default();
        let mut failing = Recorder::new("http-v4", &log);
        failing.drain_fails = true;
        let mut plaintext = vec![failing, Recorder::new("http-v6", &log)];

        let outcomes = stop_pair(Transport::Plaintext, &mut plaintext, GRACEFUL)
            .await
            .unwrap();
        assert_eq!(outcomes, vec![StopOutcome::Escalated, StopOutcome::Drained]);

        let events = events(&log);
        assert!(events.contains(&"http-v4:abort".to_string()));
        assert!(!events.contains(&"http-v6:abort".to_string()));
    }

    #[tokio::test]
    async fn failed_abort_is_fatal_but_siblings_still_stop() {
        let log = Log::default();
        let mut stuck = Recorder::new("https-v4", &log);
        stuck.drain_fails = true;
        stuck.abort_fails = true;
        let mut encrypted = vec![stuck, Recorder::new("https-v6", &log)];
        let mut plaintext = vec![Recorder::new("http-v4", &log), Recorder::new("http-v6", &log)];

        let err = stop_pairs(&mut encrypted, &mut plaintext, GRACEFUL)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::EmergencyShutdown {
                transport: Transport::Encrypted,
                ..
            }
        ));

        let events = events(&log);
        assert!(events.contains(&"https-v6:drain-end".to_string()));
        assert!(events.contains(&"http-v4:drain-end".to_string()));
        assert!(events.contains(&"http-v6:drain-end".to_string()));
    }

    #[tokio::test]
    async fn failed_abort_in_fast_mode_is_fatal() {
        let log = Log::default();
        let mut stuck = Recorder::new("http-v6", &log);
        stuck.abort_fails = true;
        let mut encrypted: Vec<Recorder> = Vec::new();
        let mut plaintext = vec![Recorder::new("http-v4", &log), stuck];

        let err = stop_pairs(&mut encrypted, &mut plaintext, StopMode::Fast)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("emergency shutdown"));
        assert_eq!(events(&log).len(), 2);
    }
}
