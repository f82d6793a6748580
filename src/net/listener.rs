//! TCP listener setup and per-endpoint serving tasks.
//!
//! # Responsibilities
//! - Bind both endpoints of a pair on one port (IPv6 sockets are v6-only so
//!   both families can share it)
//! - Accept connections and serve the caller's router over plain TCP or rustls
//! - Bound header-read time on every connection
//! - Report accept failures on the fatal channel
//!
//! Connection-level accept errors (reset, aborted, refused) only lose that
//! connection. Any other accept error ends the serving task.

use std::future::Future;
use std::io;
use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::lifecycle::shutdown::{StopError, Stoppable};
use crate::net::endpoint::{Endpoint, ListenerPair, Transport};

const LISTEN_BACKLOG: i32 = 1024;

type ConnectionError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for listener setup.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid bind address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: AddrParseError,
    },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// A serving task that stopped without being asked to.
#[derive(Debug, Error)]
#[error("{transport} listener on {address} failed: {source}")]
pub struct ServeFailure {
    pub transport: Transport,
    pub address: SocketAddr,
    #[source]
    pub source: io::Error,
}

/// Source of accepted connections for a serving task.
pub trait Incoming: Send + 'static {
    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn next_stream(&mut self) -> impl Future<Output = io::Result<TcpStream>> + Send;
}

impl Incoming for TcpListener {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }

    async fn next_stream(&mut self) -> io::Result<TcpStream> {
        let (stream, _) = self.accept().await?;
        Ok(stream)
    }
}

/// Bind both endpoints of `pair`, IPv4 first.
///
/// With port `0` the IPv6 endpoint reuses the port the kernel picked for
/// IPv4, so the two halves of a pair always share a port.
pub fn bind_pair(pair: &ListenerPair) -> Result<Vec<TcpListener>, ListenerError> {
    let mut bound = Vec::with_capacity(2);
    let mut shared_port = None;

    for endpoint in pair.endpoints() {
        let mut addr = endpoint
            .socket_addr()
            .map_err(|source| ListenerError::Address {
                address: endpoint.bind_address().to_string(),
                source,
            })?;
        if let (0, Some(port)) = (addr.port(), shared_port) {
            addr.set_port(port);
        }

        let listener = bind(endpoint, addr)?;
        let local = listener.local_addr().map_err(|source| bind_error(endpoint, source))?;
        shared_port.get_or_insert(local.port());
        bound.push(listener);
    }

    Ok(bound)
}

fn bind(endpoint: &Endpoint, addr: SocketAddr) -> Result<TcpListener, ListenerError> {
    let bind_err = |source: io::Error| bind_error(endpoint, source);

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    if addr.is_ipv6() {
        socket.set_only_v6(true).map_err(bind_err)?;
    }
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;

    TcpListener::from_std(socket.into()).map_err(bind_err)
}

fn bind_error(endpoint: &Endpoint, source: io::Error) -> ListenerError {
    ListenerError::Bind {
        address: endpoint.bind_address().to_string(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Serve,
    Drain,
    Close,
}

/// One running endpoint.
pub struct ServingListener {
    local_addr: SocketAddr,
    control: watch::Sender<Control>,
    task: Option<JoinHandle<io::Result<()>>>,
}

impl ServingListener {
    /// Start serving `app` on connections from `incoming`.
    ///
    /// With `tls` set, every connection must complete a TLS handshake
    /// before any request is read.
    pub fn spawn<L: Incoming>(
        transport: Transport,
        endpoint: &Endpoint,
        incoming: L,
        app: Router,
        tls: Option<RustlsConfig>,
        fatal_tx: mpsc::UnboundedSender<ServeFailure>,
    ) -> Result<Self, ListenerError> {
        let local_addr = incoming
            .local_addr()
            .map_err(|source| bind_error(endpoint, source))?;

        let mut builder = Builder::new(TokioExecutor::new());
        configure_http(&mut builder, endpoint.read_header_timeout());

        let (control, control_rx) = watch::channel(Control::Serve);
        let serve = accept_loop(
            incoming,
            Arc::new(builder),
            app,
            tls.map(RustlsAcceptor::new),
            control_rx,
        );
        let task = tokio::spawn(watch_serve(serve, transport, local_addr, fatal_tx));

        tracing::info!(
            transport = transport.as_str(),
            address = %local_addr,
            family = %endpoint.family(),
            "Starting handler"
        );

        Ok(Self {
            local_addr,
            control,
            task: Some(task),
        })
    }

    /// Address actually bound (differs from the endpoint when port is 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Stoppable for ServingListener {
    fn address(&self) -> SocketAddr {
        self.local_addr
    }

    async fn drain(&mut self, deadline: Option<Duration>) -> Result<(), StopError> {
        self.control.send_replace(Control::Drain);
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };

        let joined = match deadline {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => return Err(StopError::DrainTimedOut(limit)),
            },
            None => task.await,
        };
        self.task = None;

        match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(StopError::Serve(e)),
            Err(e) => Err(StopError::Join(e)),
        }
    }

    async fn abort(&mut self) -> Result<(), StopError> {
        self.control.send_replace(Control::Close);
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        // A serve error here was already reported; the socket is released
        // either way.
        task.await.map(|_| ()).map_err(StopError::Join)
    }
}

fn configure_http(builder: &mut Builder<TokioExecutor>, header_read_timeout: Duration) {
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(header_read_timeout);
}

async fn accept_loop<L: Incoming>(
    mut incoming: L,
    builder: Arc<Builder<TokioExecutor>>,
    app: Router,
    acceptor: Option<RustlsAcceptor>,
    mut control: watch::Receiver<Control>,
) -> io::Result<()> {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = wait_until(&mut control, |c| c != Control::Serve) => break,
            accepted = incoming.next_stream() => match accepted {
                Ok(stream) => {
                    connections.spawn(serve_connection(
                        stream,
                        acceptor.clone(),
                        builder.clone(),
                        app.clone(),
                        control.clone(),
                    ));
                }
                Err(e) if is_connection_error(&e) => {
                    tracing::debug!(error = %e, "Connection lost during accept");
                }
                Err(e) => return Err(e),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    // Refuse new connections while the open ones finish.
    drop(incoming);

    let draining = *control.borrow() == Control::Drain;
    if draining {
        tokio::select! {
            _ = async { while connections.join_next().await.is_some() {} } => return Ok(()),
            _ = wait_until(&mut control, |c| c == Control::Close) => {}
        }
    }

    connections.shutdown().await;
    Ok(())
}

async fn wait_until(control: &mut watch::Receiver<Control>, reached: fn(Control) -> bool) {
    loop {
        let current = *control.borrow_and_update();
        if reached(current) {
            return;
        }
        // Sender gone means the listener was dropped; stop everything.
        if control.changed().await.is_err() {
            return;
        }
    }
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

async fn serve_connection(
    stream: TcpStream,
    acceptor: Option<RustlsAcceptor>,
    builder: Arc<Builder<TokioExecutor>>,
    app: Router,
    control: watch::Receiver<Control>,
) {
    let peer = stream.peer_addr().ok();
    let result = match acceptor {
        Some(acceptor) => match acceptor.accept(stream, ()).await {
            Ok((stream, ())) => drive_connection(stream, &builder, app, control).await,
            Err(e) => {
                tracing::debug!(peer = ?peer, error = %e, "TLS handshake failed");
                return;
            }
        },
        None => drive_connection(stream, &builder, app, control).await,
    };

    if let Err(e) = result {
        tracing::debug!(peer = ?peer, error = %e, "Connection closed with error");
    }
}

async fn drive_connection<I>(
    io: I,
    builder: &Builder<TokioExecutor>,
    app: Router,
    mut control: watch::Receiver<Control>,
) -> Result<(), ConnectionError>
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let connection =
        builder.serve_connection_with_upgrades(TokioIo::new(io), TowerToHyperService::new(app));
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => return result,
        _ = wait_until(&mut control, |c| c != Control::Serve) => {}
    }

    connection.as_mut().graceful_shutdown();
    connection.await
}

async fn watch_serve<F>(
    serve: F,
    transport: Transport,
    address: SocketAddr,
    fatal_tx: mpsc::UnboundedSender<ServeFailure>,
) -> io::Result<()>
where
    F: Future<Output = io::Result<()>>,
{
    match serve.await {
        Ok(()) => {
            tracing::debug!(transport = transport.as_str(), address = %address, "Listener closed");
            Ok(())
        }
        Err(error) => {
            tracing::error!(
                transport = transport.as_str(),
                address = %address,
                error = %error,
                "Listener closed unexpectedly"
            );
            let _ = fatal_tx.send(ServeFailure {
                transport,
                address,
                source: io::Error::new(error.kind(), error.to_string()),
            });
            Err(error)
        }
    }
}
