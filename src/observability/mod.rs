//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! net + lifecycle produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (listener counters and gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
