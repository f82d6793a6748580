//! Configuration schema definitions.
//!
//! This module defines the configuration structure for the listener manager.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default header-read timeout applied to every endpoint.
pub const DEFAULT_READ_HEADER_TIMEOUT_SECS: u64 = 3;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Deployment hints deciding which listeners exist.
    pub listener: ListenerConfig,

    /// Shutdown strategy.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener deployment hints.
///
/// An empty string means "not configured".
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Port for the plaintext (HTTP) transport.
    pub http_port: String,

    /// Port for the encrypted (HTTPS) transport.
    pub https_port: String,

    /// Path to the PEM private key for the encrypted transport.
    pub https_key_file: String,

    /// Path to the PEM certificate chain for the encrypted transport.
    pub https_cert_file: String,

    /// How long a connection may spend sending request headers.
    pub read_header_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http_port: String::new(),
            https_port: String::new(),
            https_key_file: String::new(),
            https_cert_file: String::new(),
            read_header_timeout_secs: DEFAULT_READ_HEADER_TIMEOUT_SECS,
        }
    }
}

impl ListenerConfig {
    pub fn read_header_timeout(&self) -> Duration {
        Duration::from_secs(self.read_header_timeout_secs)
    }

    /// True when an HTTPS port is set alongside an HTTP port but the key
    /// material is incomplete, so the HTTPS port will be ignored.
    pub fn drops_https_port(&self) -> bool {
        !self.https_port.is_empty()
            && !self.http_port.is_empty()
            && (self.https_key_file.is_empty() || self.https_cert_file.is_empty())
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Skip draining and close every listener immediately.
    pub fast: bool,

    /// Upper bound on a graceful drain before escalating to a hard close.
    /// Absent means wait for in-flight connections indefinitely.
    pub drain_timeout_secs: Option<u64>,
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_secs.map(Duration::from_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
