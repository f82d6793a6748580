//! Dual-stack listener manager.
//!
//! Resolves which HTTP/HTTPS listeners to run on IPv4 and IPv6, starts them,
//! and stops them in order.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ServerConfig;
pub use lifecycle::{LifecycleError, ServerManager};
pub use net::Transport;
