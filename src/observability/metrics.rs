//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define breaker and health metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `breaker_calls_total` (counter): calls by breaker, outcome
//! - `breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `breaker_transitions_total` (counter): state changes by breaker, target state
//! - `breaker_call_duration_seconds` (histogram): time spent in guarded calls
//! - `health_checks_total` (counter): health reports by overall status
//! - `health_storage_latency_seconds` (histogram): storage probe latency
//!
//! # Design Decisions
//! - Updates go through the `metrics` facade; without an installed recorder
//!   they are no-ops (tests, embedded use)

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_breaker_call(breaker: &str, outcome: &'static str) {
    counter!("breaker_calls_total", "breaker" => breaker.to_owned(), "outcome" => outcome).increment(1);
}

pub fn record_breaker_state(breaker: &str, state: CircuitState) {
    gauge!("breaker_state", "breaker" => breaker.to_owned()).set(state.gauge_value());
}

pub fn record_breaker_transition(breaker: &str, to: CircuitState) {
    counter!("breaker_transitions_total", "breaker" => breaker.to_owned(), "to" => to.as_str()).increment(1);
    record_breaker_state(breaker, to);
}

pub fn record_call_duration(breaker: &str, elapsed: Duration) {
    histogram!("breaker_call_duration_seconds", "breaker" => breaker.to_owned()).record(elapsed.as_secs_f64());
}

pub fn record_health_check(status: &'static str) {
    counter!("health_checks_total", "status" => status).increment(1);
}

pub fn record_storage_latency(elapsed: Duration) {
    histogram!("health_storage_latency_seconds").record(elapsed.as_secs_f64());
}
