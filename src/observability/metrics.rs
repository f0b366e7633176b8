//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_security_headers_applied_total` (counter): by transport
//! - `guard_auth_redirects_total` (counter): anonymous hits on protected routes
//! - `guard_sessions_created_total` (counter)
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::security::transport::Transport;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Count one response that received the protective headers.
pub fn record_headers_applied(transport: Transport) {
    metrics::counter!(
        "guard_security_headers_applied_total",
        "transport" => transport.as_str()
    )
    .increment(1);
}

/// Count one anonymous request sent to the login page.
pub fn record_auth_redirect() {
    metrics::counter!("guard_auth_redirects_total").increment(1);
}

/// Count one newly issued session.
pub fn record_session_created() {
    metrics::counter!("guard_sessions_created_total").increment(1);
}
