//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Resolve (topology.rs):
//!     ports + key material → which pairs exist
//!
//! Start (manager.rs):
//!     load key material → bind all endpoints → spawn one task each
//!
//! Stop (shutdown.rs):
//!     encrypted pair → plaintext pair
//!     each endpoint: drain → (escalate to close) | close
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → owner calls stop
//! ```
//!
//! # Design Decisions
//! - Pairs are owned by the manager; nothing is global
//! - Start fails before anything runs if any endpoint cannot be bound
//! - Unrecoverable failures are returned, never turned into process exits

pub mod error;
pub mod manager;
pub mod shutdown;
pub mod signals;
pub mod topology;

pub use error::LifecycleError;
pub use manager::{PairState, ServerManager};
pub use shutdown::{StopMode, StopOutcome};
