//! Metrics collection and exposition.
//!
//! # Metrics
//! - `listener_started_total` (counter): endpoints started, by transport
//! - `listener_stopped_total` (counter): endpoints stopped, by transport and
//!   outcome (`drained`, `escalated`, `aborted`, `failed`)
//! - `listener_active` (gauge): endpoints currently serving, by transport
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::net::endpoint::Transport;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_listener_started(transport: Transport) {
    metrics::counter!("listener_started_total", "transport" => transport.as_str()).increment(1);
    metrics::gauge!("listener_active", "transport" => transport.as_str()).increment(1.0);
}

pub fn record_listener_stopped(transport: Transport, outcome: &'static str) {
    metrics::counter!(
        "listener_stopped_total",
        "transport" => transport.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::gauge!("listener_active", "transport" => transport.as_str()).decrement(1.0);
}
