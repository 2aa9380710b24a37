//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_rejected_total` (counter): unauthorized prefixes by mode
//! - `proxy_rate_limited_total` (counter): requests turned away by the gate
//! - `proxy_upstream_errors_total` (counter): forwarding failures by kind
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::PrefixMode;

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to start metrics exporter");
            return;
        }
    }

    describe_counter!("proxy_requests_total", "Requests answered, by method and status");
    describe_histogram!(
        "proxy_request_duration_seconds",
        "Time from request arrival to response head"
    );
    describe_counter!("proxy_rejected_total", "Requests with an unauthorized prefix");
    describe_counter!("proxy_rate_limited_total", "Requests turned away by the rate limiter");
    describe_counter!("proxy_upstream_errors_total", "Failed forwarding attempts");
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    counter!("proxy_requests_total", "method" => method.clone(), "status" => status.clone())
        .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method, "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejected(mode: PrefixMode) {
    counter!("proxy_rejected_total", "mode" => mode.to_string()).increment(1);
}

pub fn record_rate_limited() {
    counter!("proxy_rate_limited_total").increment(1);
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}
