//! Unrecoverable lifecycle failures.
//!
//! Every variant means the process can no longer serve reliably. The owner
//! decides how to terminate; nothing in this crate exits the process.

use std::net::SocketAddr;

use thiserror::Error;

use crate::lifecycle::shutdown::StopError;
use crate::net::endpoint::Transport;
use crate::net::listener::{ListenerError, ServeFailure};
use crate::net::tls::TlsError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The encrypted pair's key material could not be loaded at start.
    #[error("HTTPS key material unusable: {0}")]
    Tls(#[from] TlsError),

    /// An endpoint could not be bound at start.
    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// `start` was called after listeners were already started.
    #[error("listeners were already started")]
    AlreadyStarted,

    /// A running endpoint stopped serving on its own.
    #[error(transparent)]
    Serve(#[from] ServeFailure),

    /// An endpoint could not be closed, leaving its socket in an unknown state.
    #[error("{transport} emergency shutdown of {address} failed: {source}")]
    EmergencyShutdown {
        transport: Transport,
        address: SocketAddr,
        #[source]
        source: StopError,
    },
}
