//! Metrics collection and exposition.
//!
//! # Metrics
//! - `switchyard_exchanges_total` (counter): claimed exchanges by stage, status
//! - `switchyard_exchange_duration_seconds` (histogram): time until claim
//! - `switchyard_pipeline_failures_total` (counter): HTTP pipeline failures by kind
//! - `switchyard_ws_lookups_total` (counter): registry lookups by result
//! - `switchyard_fallback_total` (counter): requests answered below context-path
//! - `switchyard_active_connections` (gauge): live connection count
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record an exchange that reached a terminal state.
pub fn record_exchange(stage: &str, status: u16, elapsed: Duration) {
    let stage = stage.to_string();
    let status = status.to_string();
    counter!(
        "switchyard_exchanges_total",
        "stage" => stage.clone(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        "switchyard_exchange_duration_seconds",
        "stage" => stage,
        "status" => status
    )
    .record(elapsed.as_secs_f64());
}

/// Record a failure caught by the HTTP pipeline boundary.
pub fn record_pipeline_failure(kind: &'static str) {
    counter!("switchyard_pipeline_failures_total", "kind" => kind).increment(1);
}

/// Record a WebSocket registry lookup.
pub fn record_ws_lookup(found: bool) {
    let result = if found { "found" } else { "not_found" };
    counter!("switchyard_ws_lookups_total", "result" => result).increment(1);
}

/// Record a request answered by the fallback stage.
pub fn record_fallback() {
    counter!("switchyard_fallback_total").increment(1);
}

pub fn set_active_connections(count: u64) {
    gauge!("switchyard_active_connections").set(count as f64);
}
