//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pacer_admissions_total` (counter): completed limiter admissions
//! - `pacer_admission_wait_seconds` (histogram): time spent waiting for a slot
//! - `pacer_requests_total` (counter): requests by method, status
//! - `pacer_request_duration_seconds` (histogram): latency through the middleware
//! - `pacer_spans_exported_total` / `pacer_span_export_errors_total` /
//!   `pacer_spans_dropped_total` (counters): telemetry pipeline health
//!
//! Recording goes through the `metrics` facade and is a no-op until an
//! exporter is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::pacing::Admission;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_admission(admission: &Admission) {
    counter!("pacer_admissions_total").increment(1);
    histogram!("pacer_admission_wait_seconds").record(admission.waited.as_secs_f64());
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "pacer_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("pacer_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_spans_exported(count: usize) {
    counter!("pacer_spans_exported_total").increment(count as u64);
}

pub fn record_span_export_error() {
    counter!("pacer_span_export_errors_total").increment(1);
}

pub fn record_span_dropped() {
    counter!("pacer_spans_dropped_total").increment(1);
}
