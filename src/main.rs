//! Dual-stack listener manager.
//!
//! ```text
//!   HTTP_PORT / HTTPS_PORT / key + cert
//!              │
//!              ▼
//!     ┌─────────────────┐
//!     │    topology     │  which pairs exist
//!     └────────┬────────┘
//!              ▼
//!     ┌─────────────────┐      0.0.0.0:<https>  [::]:<https>   (rustls)
//!     │  ServerManager  │────▶ 0.0.0.0:<http>   [::]:<http>
//!     └────────┬────────┘
//!              │  SIGINT / SIGTERM, or a listener failure
//!              ▼
//!        stop: HTTPS first, then HTTP
//! ```

use std::path::PathBuf;

use clap::Parser;

use listener_manager::config::{resolve_config, ConfigOverrides};
use listener_manager::http::build_router;
use listener_manager::lifecycle::signals::shutdown_signal;
use listener_manager::observability::{logging, metrics};
use listener_manager::ServerManager;

#[derive(Parser)]
#[command(name = "listener-manager")]
#[command(about = "Serve HTTP and HTTPS on IPv4 and IPv6 with ordered shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Plaintext port.
    #[arg(long, env = "HTTP_PORT")]
    http_port: Option<String>,

    /// Encrypted port; reused for plaintext when no key material or HTTP port is given.
    #[arg(long, env = "HTTPS_PORT")]
    https_port: Option<String>,

    /// PEM private key for HTTPS.
    #[arg(long, env = "HTTPS_KEY_FILE")]
    https_key_file: Option<String>,

    /// PEM certificate chain for HTTPS.
    #[arg(long, env = "HTTPS_CERT_FILE")]
    https_cert_file: Option<String>,

    /// Close listeners immediately instead of draining.
    #[arg(long, env = "FAST_SHUTDOWN")]
    fast_shutdown: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            http_port: self.http_port.clone(),
            https_port: self.https_port.clone(),
            https_key_file: self.https_key_file.clone(),
            https_cert_file: self.https_cert_file.clone(),
            fast_shutdown: self.fast_shutdown,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref(), cli.overrides())?;

    logging::init_logging(&config.observability)?;
    tracing::info!("listener-manager v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    if config.listener.drops_https_port() {
        tracing::warn!(
            https_port = %config.listener.https_port,
            "HTTPS port ignored: key and certificate files are both required"
        );
    }

    let mut manager = ServerManager::from_config(&config);
    if let Err(e) = manager.start(build_router()).await {
        tracing::error!(error = %e, "Failed to start listeners");
        return Err(e.into());
    }

    let failure = tokio::select! {
        signal = shutdown_signal() => {
            tracing::info!(?signal, "Shutdown requested");
            None
        }
        Some(e) = manager.fatal_error() => Some(e),
    };

    if let Some(e) = failure {
        tracing::error!(error = %e, "Listener failed, shutting down");
        manager.set_fast_shutdown(true);
        if let Err(stop_err) = manager.stop().await {
            tracing::error!(error = %stop_err, "Emergency shutdown failed");
        }
        return Err(e.into());
    }

    if let Err(e) = manager.stop().await {
        tracing::error!(error = %e, "Emergency shutdown failed");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
