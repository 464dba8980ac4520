//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rejections_total` (counter): pipeline rejections by gate and kind
//! - `gateway_store_fallbacks_total` (counter): shared-store calls answered locally
//! - `gateway_synthesis_jobs_total` (counter): synthesis jobs by outcome
//!
//! Recording is a no-op until [`init_metrics`] installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!("gateway_requests_total", "method" => method.to_string(), "status" => status.clone())
        .increment(1);
    histogram!("gateway_request_duration_seconds", "method" => method.to_string(), "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(gate: &'static str, kind: &'static str) {
    counter!("gateway_rejections_total", "gate" => gate, "kind" => kind).increment(1);
}

pub fn record_store_fallback(store: &'static str) {
    counter!("gateway_store_fallbacks_total", "store" => store).increment(1);
}

pub fn record_synthesis(outcome: &'static str) {
    counter!("gateway_synthesis_jobs_total", "outcome" => outcome).increment(1);
}
