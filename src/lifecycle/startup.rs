//! Startup orchestration for the telemetry pipeline.
//!
//! Runs after configuration is validated and before the listener is bound,
//! so a metrics or exporter failure aborts startup before traffic arrives.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ExporterKind, TelemetryConfig};
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::observability::sink::{
    BatchConfig, BatchHandle, BatchSpanProcessor, LogExporter, NullExporter, StdoutExporter,
};
use crate::observability::SpanSink;

/// Running span pipeline: the sink to hand to the server and its owner handle.
pub struct SpanPipeline {
    pub sink: Arc<dyn SpanSink>,
    pub handle: BatchHandle,
}

/// Install the Prometheus exporter if enabled.
pub fn start_metrics(config: &TelemetryConfig) -> Result<(), GatewayError> {
    if !config.metrics_enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .metrics_address
        .parse()
        .map_err(|e: std::net::AddrParseError| GatewayError::Metrics(e.to_string()))?;
    metrics::init_metrics(addr).map_err(|e| GatewayError::Metrics(e.to_string()))
}

/// Spawn the batching span processor for the configured exporter.
pub fn start_span_pipeline(config: &TelemetryConfig) -> SpanPipeline {
    let batch = BatchConfig {
        max_batch_size: config.max_batch_size,
        batch_timeout: Duration::from_millis(config.batch_timeout_ms),
        max_queue_size: config.max_queue_size,
    };

    let (processor, handle) = match config.exporter {
        ExporterKind::Log => BatchSpanProcessor::spawn(LogExporter, batch),
        ExporterKind::Stdout => BatchSpanProcessor::spawn(StdoutExporter, batch),
        ExporterKind::None => BatchSpanProcessor::spawn(NullExporter, batch),
    };

    tracing::info!(
        service = %config.service_name,
        exporter = ?config.exporter,
        sampler = ?config.sampler,
        "Span pipeline started"
    );

    SpanPipeline {
        sink: Arc::new(processor),
        handle,
    }
}
