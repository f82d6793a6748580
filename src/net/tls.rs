//! TLS configuration and certificate loading.

use std::io;
use std::path::PathBuf;

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

use crate::net::endpoint::TlsMaterial;

/// Error type for loading the encrypted pair's key material.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("certificate file not found: {}", .0.display())]
    MissingCertificate(PathBuf),

    #[error("private key file not found: {}", .0.display())]
    MissingKey(PathBuf),

    #[error("failed to load TLS material: {0}")]
    Load(#[source] io::Error),
}

/// Load a rustls server configuration from PEM certificate and key files.
pub async fn load_tls_config(material: &TlsMaterial) -> Result<RustlsConfig, TlsError> {
    if !material.cert_path.exists() {
        return Err(TlsError::MissingCertificate(material.cert_path.clone()));
    }
    if !material.key_path.exists() {
        return Err(TlsError::MissingKey(material.key_path.clone()));
    }

    RustlsConfig::from_pem_file(&material.cert_path, &material.key_path)
        .await
        .map_err(TlsError::Load)
}
