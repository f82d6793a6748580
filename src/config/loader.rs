//! Configuration loading from disk and command-line overrides.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values supplied on the command line or through the environment.
///
/// `None` leaves the file (or default) value in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub http_port: Option<String>,
    pub https_port: Option<String>,
    pub https_key_file: Option<String>,
    pub https_cert_file: Option<String>,
    pub fast_shutdown: bool,
    pub log_level: Option<String>,
}

impl ConfigOverrides {
    /// Apply overrides on top of `config`.
    pub fn apply(self, config: &mut ServerConfig) {
        let listener = &mut config.listener;
        if let Some(port) = self.http_port {
            listener.http_port = port;
        }
        if let Some(port) = self.https_port {
            listener.https_port = port;
        }
        if let Some(path) = self.https_key_file {
            listener.https_key_file = path;
        }
        if let Some(path) = self.https_cert_file {
            listener.https_cert_file = path;
        }
        if self.fast_shutdown {
            config.shutdown.fast = true;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
    }
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ServerConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build the effective configuration: defaults, then the optional file,
/// then overrides. The merged result is validated once more.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<ServerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
