//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Collect every problem instead of stopping at the first

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be empty or a port number, got {value:?}")]
    InvalidPort { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("log_level must be one of trace, debug, info, warn, error, got {0:?}")]
    InvalidLogLevel(String),

    #[error("metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let listener = &config.listener;

    for (field, value) in [
        ("http_port", &listener.http_port),
        ("https_port", &listener.https_port),
    ] {
        if !value.is_empty() && value.parse::<u16>().is_err() {
            errors.push(ValidationError::InvalidPort {
                field,
                value: value.clone(),
            });
        }
    }

    if listener.read_header_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDuration {
            field: "read_header_timeout_secs",
        });
    }

    if config.shutdown.drain_timeout_secs == Some(0) {
        errors.push(ValidationError::ZeroDuration {
            field: "drain_timeout_secs",
        });
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(
            observability.log_level.clone(),
        ));
    }

    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
