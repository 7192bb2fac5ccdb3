//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_upstream_retries_total` (counter): retries by backend
//! - `gateway_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_circuit_rejections_total` (counter): fail-fast rejections
//! - `gateway_rate_limited_total` (counter): admission rejections by route
//! - `gateway_aggregations_total` (counter): aggregated views by outcome
//! - `gateway_backend_health` (gauge): 1=healthy, 0=not
//!
//! # Design Decisions
//! - Recording never fails the request path; absent recorder is a no-op
//! - Low-cardinality labels only (route name, backend name, status code)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        tracing::error!(error = %e, "Failed to install metrics exporter");
    } else {
        tracing::info!(address = %addr, "Metrics exporter listening");
    }
}

/// One completed inbound request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string(),
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_retry(backend: &'static str) {
    counter!("gateway_upstream_retries_total", "backend" => backend).increment(1);
}

pub fn record_circuit_state(backend: &'static str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    gauge!("gateway_circuit_state", "backend" => backend).set(value);
}

pub fn record_circuit_rejection(backend: &'static str) {
    counter!("gateway_circuit_rejections_total", "backend" => backend).increment(1);
}

pub fn record_rate_limited(route: &str, reason: &'static str) {
    counter!(
        "gateway_rate_limited_total",
        "route" => route.to_string(),
        "reason" => reason,
    )
    .increment(1);
}

pub fn record_aggregation(success: bool) {
    let outcome = if success { "success" } else { "required_failed" };
    counter!("gateway_aggregations_total", "outcome" => outcome).increment(1);
}

pub fn record_backend_health(backend: &'static str, healthy: bool) {
    gauge!("gateway_backend_health", "backend" => backend).set(if healthy { 1.0 } else { 0.0 });
}
