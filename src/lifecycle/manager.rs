//! The listener manager.
//!
//! Owns the resolved topology and the endpoints started from it. The owner
//! calls [`ServerManager::start`] once and [`ServerManager::stop`] once, in
//! that order, never concurrently.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::sync::mpsc;

use crate::config::schema::{ServerConfig, DEFAULT_READ_HEADER_TIMEOUT_SECS};
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::shutdown::{self, StopMode};
use crate::lifecycle::topology::{self, ListenerHints, Topology};
use crate::net::endpoint::{ListenerPair, Transport};
use crate::net::listener::{self, ServeFailure, ServingListener};
use crate::net::tls::load_tls_config;
use crate::observability::metrics;

/// Lifecycle state of one listener pair.
///
/// Draining happens inside [`ServerManager::stop`] and is never observable
/// from outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Unconfigured,
    Configured,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolved,
    Running,
    Stopped,
}

pub struct ServerManager {
    topology: Topology,
    fast_shutdown: bool,
    drain_timeout: Option<Duration>,
    phase: Phase,
    plaintext_running: Vec<ServingListener>,
    encrypted_running: Vec<ServingListener>,
    fatal_tx: mpsc::UnboundedSender<ServeFailure>,
    fatal_rx: mpsc::UnboundedReceiver<ServeFailure>,
}

impl ServerManager {
    /// Resolve the topology from the four deployment hints, using the
    /// default header-read timeout and a graceful, unbounded drain.
    pub fn new(
        http_port: &str,
        https_port: &str,
        https_key_file: &str,
        https_cert_file: &str,
    ) -> Self {
        let hints = ListenerHints {
            http_port,
            https_port,
            https_key_file,
            https_cert_file,
        };
        Self::from_topology(topology::resolve(
            hints,
            Duration::from_secs(DEFAULT_READ_HEADER_TIMEOUT_SECS),
        ))
    }

    /// Resolve the topology and shutdown policy from a validated config.
    pub fn from_config(config: &ServerConfig) -> Self {
        let listener = &config.listener;
        let hints = ListenerHints {
            http_port: &listener.http_port,
            https_port: &listener.https_port,
            https_key_file: &listener.https_key_file,
            https_cert_file: &listener.https_cert_file,
        };

        let mut manager =
            Self::from_topology(topology::resolve(hints, listener.read_header_timeout()));
        manager.fast_shutdown = config.shutdown.fast;
        manager.drain_timeout = config.shutdown.drain_timeout();
        manager
    }

    fn from_topology(topology: Topology) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        Self {
            topology,
            fast_shutdown: false,
            drain_timeout: None,
            phase: Phase::Resolved,
            plaintext_running: Vec::new(),
            encrypted_running: Vec::new(),
            fatal_tx,
            fatal_rx,
        }
    }

    pub fn plaintext(&self) -> Option<&ListenerPair> {
        self.topology.plaintext.as_ref()
    }

    pub fn encrypted(&self) -> Option<&ListenerPair> {
        self.topology.encrypted.as_ref()
    }

    /// True iff both the plaintext and the encrypted pair are configured.
    pub fn both_configured(&self) -> bool {
        self.topology.both_configured()
    }

    pub fn fast_shutdown(&self) -> bool {
        self.fast_shutdown
    }

    /// Choose the stop strategy. Only meaningful before [`stop`](Self::stop).
    pub fn set_fast_shutdown(&mut self, fast: bool) {
        self.fast_shutdown = fast;
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout
    }

    /// Bound graceful drains; `None` waits for in-flight connections
    /// indefinitely.
    pub fn set_drain_timeout(&mut self, timeout: Option<Duration>) {
        self.drain_timeout = timeout;
    }

    pub fn state(&self, transport: Transport) -> PairState {
        let configured = match transport {
            Transport::Plaintext => self.topology.plaintext.is_some(),
            Transport::Encrypted => self.topology.encrypted.is_some(),
        };
        if !configured {
            return PairState::Unconfigured;
        }
        match self.phase {
            Phase::Resolved => PairState::Configured,
            Phase::Running => PairState::Running,
            Phase::Stopped => PairState::Stopped,
        }
    }

    /// Addresses the running endpoints of `transport` are bound to, IPv4
    /// first. Empty before start and after stop.
    pub fn local_addrs(&self, transport: Transport) -> Vec<SocketAddr> {
        let running = match transport {
            Transport::Plaintext => &self.plaintext_running,
            Transport::Encrypted => &self.encrypted_running,
        };
        running.iter().map(ServingListener::local_addr).collect()
    }

    /// Bind every configured endpoint and spawn its serving task.
    ///
    /// Returns as soon as all tasks are spawned. Key material is loaded and
    /// every socket bound before any task starts, so a failure leaves
    /// nothing running and `start` may be retried. Once it succeeded, later
    /// calls fail with [`LifecycleError::AlreadyStarted`].
    pub async fn start(&mut self, app: Router) -> Result<(), LifecycleError> {
        if self.phase != Phase::Resolved {
            return Err(LifecycleError::AlreadyStarted);
        }

        tracing::info!(
            http_port = self.topology.plaintext.as_ref().map(ListenerPair::port),
            https_port = self.topology.encrypted.as_ref().map(ListenerPair::port),
            "Starting listeners"
        );

        let encrypted_tls = match self.topology.encrypted.as_ref().and_then(ListenerPair::tls) {
            Some(material) => Some(load_tls_config(material).await?),
            None => None,
        };

        let mut bound = Vec::with_capacity(4);
        for pair in [&self.topology.plaintext, &self.topology.encrypted]
            .into_iter()
            .flatten()
        {
            let sockets = listener::bind_pair(pair)?;
            for (endpoint, socket) in pair.endpoints().iter().zip(sockets) {
                bound.push((pair.transport(), endpoint, socket));
            }
        }

        for (transport, endpoint, socket) in bound {
            let tls = match transport {
                Transport::Encrypted => encrypted_tls.clone(),
                Transport::Plaintext => None,
            };
            let serving = ServingListener::spawn(
                transport,
                endpoint,
                socket,
                app.clone(),
                tls,
                self.fatal_tx.clone(),
            )?;
            metrics::record_listener_started(transport);

            match transport {
                Transport::Plaintext => self.plaintext_running.push(serving),
                Transport::Encrypted => self.encrypted_running.push(serving),
            }
        }

        self.phase = Phase::Running;
        Ok(())
    }

    /// Wait for a running endpoint to fail on its own.
    ///
    /// Never resolves while every endpoint is healthy, so it is meant to be
    /// raced against the shutdown trigger.
    pub async fn fatal_error(&mut self) -> Option<LifecycleError> {
        self.fatal_rx.recv().await.map(LifecycleError::from)
    }

    /// Stop every running endpoint, encrypted pair first.
    ///
    /// Returns `Ok(true)` once all endpoints are stopped, or the first
    /// unrecoverable error after every endpoint was processed.
    pub async fn stop(&mut self) -> Result<bool, LifecycleError> {
        let mode = if self.fast_shutdown {
            StopMode::Fast
        } else {
            StopMode::Graceful {
                deadline: self.drain_timeout,
            }
        };

        tracing::info!(
            fast = self.fast_shutdown,
            both_configured = self.both_configured(),
            "Stopping listeners"
        );

        let result = shutdown::stop_pairs(
            &mut self.encrypted_running,
            &mut self.plaintext_running,
            mode,
        )
        .await;

        self.encrypted_running.clear();
        self.plaintext_running.clear();
        if self.phase == Phase::Running {
            self.phase = Phase::Stopped;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::config::ServerConfig;
    use crate::net::listener::test_support::ScriptedIncoming;

    #[tokio::test]
    async fn empty_manager_is_a_no_op() {
        let mut manager = ServerManager::new("", "", "", "");
        assert!(manager.plaintext().is_none());
        assert!(manager.encrypted().is_none());
        assert_eq!(manager.state(Transport::Plaintext), PairState::Unconfigured);

        manager.start(Router::new()).await.unwrap();
        assert!(manager.local_addrs(Transport::Plaintext).is_empty());
        assert!(manager.stop().await.unwrap());
        assert_eq!(manager.state(Transport::Encrypted), PairState::Unconfigured);
    }

    #[test]
    fn both_configured_follows_pairs() {
        assert!(ServerManager::new("8080", "8443", "k", "c").both_configured());
        assert!(!ServerManager::new("", "8443", "k", "c").both_configured());
        assert!(!ServerManager::new("8080", "", "", "").both_configured());
    }

    #[test]
    fn defaults_to_graceful_shutdown() {
        let mut manager = ServerManager::new("8080", "", "", "");
        assert!(!manager.fast_shutdown());
        assert_eq!(manager.drain_timeout(), None);
        assert_eq!(
            manager.plaintext().unwrap().endpoints()[0].read_header_timeout(),
            Duration::from_secs(3)
        );

        manager.set_fast_shutdown(true);
        assert!(manager.fast_shutdown());
    }

    #[test]
    fn from_config_carries_shutdown_policy() {
        let mut config = ServerConfig::default();
        config.listener.http_port = "8080".into();
        config.listener.read_header_timeout_secs = 7;
        config.shutdown.fast = true;
        config.shutdown.drain_timeout_secs = Some(15);

        let manager = ServerManager::from_config(&config);
        assert!(manager.fast_shutdown());
        assert_eq!(manager.drain_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(manager.state(Transport::Plaintext), PairState::Configured);
        assert_eq!(
            manager.plaintext().unwrap().endpoints()[1].read_header_timeout(),
            Duration::from_secs(7)
        );
    }

    #[tokio::test]
    async fn missing_key_material_fails_start_before_binding() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key.pem");
        let cert = dir.path().join("cert.pem");
        let mut manager =
            ServerManager::new("0", "0", key.to_str().unwrap(), cert.to_str().unwrap());

        let err = manager.start(Router::new()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Tls(_)));
        assert!(manager.local_addrs(Transport::Plaintext).is_empty());
        assert_eq!(manager.state(Transport::Plaintext), PairState::Configured);
    }

    #[tokio::test]
    async fn invalid_port_fails_start() {
        let mut manager = ServerManager::new("eighty", "", "", "");
        let err = manager.start(Router::new()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Listener(_)));
    }

    #[tokio::test]
    async fn stop_before_start_keeps_pairs_configured() {
        let mut manager = ServerManager::new("8080", "", "", "");
        assert!(manager.stop().await.unwrap());
        assert_eq!(manager.state(Transport::Plaintext), PairState::Configured);
    }

    #[tokio::test]
    async fn failed_start_is_not_reported_as_stopped() {
        let mut manager = ServerManager::new("eighty", "", "", "");
        assert!(manager.start(Router::new()).await.is_err());
        assert!(manager.stop().await.unwrap());
        assert_eq!(manager.state(Transport::Plaintext), PairState::Configured);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        if std::net::TcpListener::bind("[::1]:0").is_err() {
            return;
        }

        let mut manager = ServerManager::new("0", "", "", "");
        manager.start(Router::new()).await.unwrap();
        let addrs = manager.local_addrs(Transport::Plaintext);
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0].port(), addrs[1].port());

        let err = manager.start(Router::new()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyStarted));
        assert_eq!(manager.local_addrs(Transport::Plaintext), addrs);

        assert!(manager.stop().await.unwrap());
        assert_eq!(manager.state(Transport::Plaintext), PairState::Stopped);
        assert!(matches!(
            manager.start(Router::new()).await,
            Err(LifecycleError::AlreadyStarted)
        ));
    }

    /// Puts one healthy loopback endpoint and one whose accept fails with
    /// `error` into the running plaintext pair.
    async fn running_with_failing_endpoint(error: io::Error) -> ServerManager {
        let mut manager = ServerManager::new("0", "", "", "");
        let pair = manager.plaintext().cloned().unwrap();
        let endpoint = &pair.endpoints()[0];

        let healthy = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let failing =
            ScriptedIncoming::new(SocketAddr::from(([127, 0, 0, 1], 1)), [error]);
        for serving in [
            ServingListener::spawn(
                Transport::Plaintext,
                endpoint,
                healthy,
                Router::new(),
                None,
                manager.fatal_tx.clone(),
            ),
            ServingListener::spawn(
                Transport::Plaintext,
                endpoint,
                failing,
                Router::new(),
                None,
                manager.fatal_tx.clone(),
            ),
        ] {
            manager.plaintext_running.push(serving.unwrap());
        }
        manager.phase = Phase::Running;
        manager
    }

    #[tokio::test]
    async fn accept_failure_surfaces_and_fast_stop_succeeds() {
        let mut manager =
            running_with_failing_endpoint(io::Error::other("too many open files")).await;

        let err = tokio::time::timeout(Duration::from_secs(1), manager.fatal_error())
            .await
            .unwrap()
            .unwrap();
        match err {
            LifecycleError::Serve(failure) => {
                assert_eq!(failure.transport, Transport::Plaintext);
                assert_eq!(failure.address, SocketAddr::from(([127, 0, 0, 1], 1)));
            }
            other => panic!("unexpected error: {other}"),
        }

        manager.set_fast_shutdown(true);
        assert!(manager.stop().await.unwrap());
        assert_eq!(manager.state(Transport::Plaintext), PairState::Stopped);
        assert!(manager.local_addrs(Transport::Plaintext).is_empty());
    }

    #[tokio::test]
    async fn graceful_stop_escalates_past_a_failed_endpoint() {
        let mut manager =
            running_with_failing_endpoint(io::Error::other("too many open files")).await;
        assert!(manager.fatal_error().await.is_some());

        assert!(manager.stop().await.unwrap());
        assert_eq!(manager.state(Transport::Plaintext), PairState::Stopped);
    }
}
