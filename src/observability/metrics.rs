//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, status, request type
//! - `http_request_duration_seconds` (histogram): end-to-end latency
//! - `fastcgi_errors_total` (counter): backend failures by kind
//! - `rate_limited_total` (counter): requests rejected with 429
//! - `interpreter_up` (gauge): 1 = socket accepts connections, 0 = not
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Label values are small closed sets (no paths, no hosts)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint. Must run inside the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, request_type: &str, start: Instant) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "request_type" => request_type.to_string()
    )
    .increment(1);
    metrics::histogram!("http_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_fastcgi_error(kind: &'static str) {
    metrics::counter!("fastcgi_errors_total", "kind" => kind).increment(1);
}

pub fn record_rate_limited() {
    metrics::counter!("rate_limited_total").increment(1);
}

pub fn record_interpreter_health(version: &str, up: bool) {
    metrics::gauge!("interpreter_up", "version" => version.to_string()).set(if up { 1.0 } else { 0.0 });
}
