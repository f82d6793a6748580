//! Shared utilities for integration tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::{routing::get, Router};

/// Whether the host can bind IPv6 sockets. Every started pair binds `[::]`,
/// so tests that start listeners skip without it.
pub fn ipv6_available() -> bool {
    std::net::TcpListener::bind("[::1]:0").is_ok()
}

/// Write a self-signed certificate for `localhost` and return
/// `(key_path, cert_path)`.
#[allow(dead_code)]
pub fn write_self_signed(dir: &Path) -> (PathBuf, PathBuf) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let key_path = dir.join("key.pem");
    let cert_path = dir.join("cert.pem");
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();
    std::fs::write(&cert_path, cert.pem()).unwrap();
    (key_path, cert_path)
}

/// Router whose `/slow` handler takes `delay` to answer.
#[allow(dead_code)]
pub fn slow_router(delay: Duration) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/slow",
            get(move || async move {
                tokio::time::sleep(delay).await;
                "done"
            }),
        )
}

/// Client without pooling or proxies that accepts self-signed certificates.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
