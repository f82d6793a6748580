//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerPair (endpoint.rs)
//!     → listener.rs (bind 0.0.0.0:<port> and [::]:<port>)
//!     → tls.rs (rustls config for the encrypted pair)
//!     → serving task (accept loop + hyper-util connections, one per endpoint)
//! ```
//!
//! # Design Decisions
//! - IPv6 sockets are v6-only so both families share a port
//! - Header-read timeout bounds slow clients on every connection
//! - TLS is loaded once per pair and shared by both endpoints

pub mod endpoint;
pub mod listener;
pub mod tls;

pub use endpoint::{AddressFamily, Endpoint, ListenerPair, TlsMaterial, Transport};
