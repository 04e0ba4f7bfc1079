//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch chain, adapters, listener produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by EnvFilter)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Connection id rides on a span so every event for a connection carries it
//! - Metric calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
