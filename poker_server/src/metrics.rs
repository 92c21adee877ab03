//! Prometheus metrics for the poker service.
//!
//! A standalone scrape listener serves the text exposition format; the
//! functions below are thin wrappers around the `metrics` macros so call
//! sites stay one-liners.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter on its own listener.
pub fn init(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))
}

/// Count every accepted table or lobby socket.
pub fn websocket_connections_total() {
    metrics::counter!("websocket_connections_total").increment(1);
}

/// Count inbound socket frames.
pub fn websocket_messages_received() {
    metrics::counter!("websocket_messages_received").increment(1);
}

/// Current number of live tables.
pub fn active_tables(count: usize) {
    metrics::gauge!("active_tables").set(count as f64);
}

/// Current number of tournaments in the registry.
pub fn tournaments_total(count: usize) {
    metrics::gauge!("tournaments_total").set(count as f64);
}

/// Count identity verifications by outcome.
pub fn identity_checks_total(success: bool) {
    metrics::counter!("identity_checks_total",
        "success" => success.to_string()
    )
    .increment(1);
}
