//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → config file (TOML, optional) via loader.rs
//!     → CLI / environment overrides
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → ServerManager::from_config
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Empty strings mean "not configured" for listener hints
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, resolve_config, ConfigError, ConfigOverrides};
pub use schema::{ListenerConfig, LogFormat, ObservabilityConfig, ServerConfig, ShutdownConfig};
