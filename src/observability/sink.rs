//! Telemetry sink: where finished spans go.
//!
//! # Data Flow
//! ```text
//! ActiveSpan::end()
//!     → SpanSink::record(SpanData)            (sync, never blocks a request)
//!         → InMemorySink                      (tests)
//!         → BatchSpanProcessor                (bounded mpsc queue)
//!             → worker task batches by size / timeout
//!             → SpanExporter::export(batch)   (log, stdout JSON, null)
//! ```

use std::future::Future;
use std::mem;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::observability::metrics;
use crate::observability::span::SpanData;

/// Accepts finished spans. Implementations must not block.
pub trait SpanSink: Send + Sync {
    fn record(&self, span: SpanData);
}

/// Keeps every recorded span in memory.
#[derive(Debug, Default)]
pub struct InMemorySink {
    spans: Mutex<Vec<SpanData>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn spans(&self) -> Vec<SpanData> {
        self.lock().clone()
    }

    pub fn spans_named(&self, name: &str) -> Vec<SpanData> {
        self.lock()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SpanData>> {
        // A panic while holding the lock cannot leave the Vec half-written.
        self.spans.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SpanSink for InMemorySink {
    fn record(&self, span: SpanData) {
        self.lock().push(span);
    }
}

/// Failure to hand a batch to its destination.
#[derive(Debug, Clone, Error)]
pub enum ExportError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Destination for batches of finished spans.
pub trait SpanExporter: Send + Sync + 'static {
    fn export(&self, batch: Vec<SpanData>) -> impl Future<Output = Result<(), ExportError>> + Send;

    fn name(&self) -> &str;
}

/// Emits one structured `tracing` event per span.
#[derive(Debug, Default)]
pub struct LogExporter;

impl SpanExporter for LogExporter {
    async fn export(&self, batch: Vec<SpanData>) -> Result<(), ExportError> {
        for span in &batch {
            let attributes = serde_json::to_string(&span.attributes)
                .map_err(|e| ExportError::Serialization(e.to_string()))?;
            tracing::info!(
                target: "rate_pacer::spans",
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                parent_span_id = ?span.parent_span_id.map(|id| id.to_string()),
                scope = %span.scope,
                name = %span.name,
                status = ?span.status,
                duration_us = span.duration().as_micros() as u64,
                attributes = %attributes,
                "Span finished"
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Writes one JSON document per span to stdout.
#[derive(Debug, Default)]
pub struct StdoutExporter;

impl SpanExporter for StdoutExporter {
    async fn export(&self, batch: Vec<SpanData>) -> Result<(), ExportError> {
        let mut out = String::new();
        for span in &batch {
            let line = serde_json::to_string(span)
                .map_err(|e| ExportError::Serialization(e.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }
        print!("{out}");
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullExporter;

impl SpanExporter for NullExporter {
    async fn export(&self, _batch: Vec<SpanData>) -> Result<(), ExportError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Batching parameters.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Flush once this many spans are pending.
    pub max_batch_size: usize,
    /// Flush at least this often while spans are pending.
    pub batch_timeout: Duration,
    /// Spans beyond this many queued are dropped.
    pub max_queue_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 512,
            batch_timeout: Duration::from_secs(5),
            max_queue_size: 2048,
        }
    }
}

/// Non-blocking sink that feeds a background batching worker.
#[derive(Debug, Clone)]
pub struct BatchSpanProcessor {
    tx: mpsc::Sender<SpanData>,
}

/// Owner handle for the batching worker.
#[derive(Debug)]
pub struct BatchHandle {
    stop: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

impl BatchSpanProcessor {
    /// Spawn the worker on the current Tokio runtime.
    pub fn spawn<E: SpanExporter>(exporter: E, config: BatchConfig) -> (Self, BatchHandle) {
        let (tx, rx) = mpsc::channel(config.max_queue_size.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();

        tracing::debug!(
            exporter = exporter.name(),
            max_batch_size = config.max_batch_size,
            batch_timeout = ?config.batch_timeout,
            "Span batch processor started"
        );
        let worker = tokio::spawn(run_worker(exporter, rx, stop_rx, config));

        (Self { tx }, BatchHandle { stop: stop_tx, worker })
    }
}

impl SpanSink for BatchSpanProcessor {
    fn record(&self, span: SpanData) {
        match self.tx.try_send(span) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(span)) => {
                tracing::warn!(name = %span.name, "Span queue full, dropping span");
                metrics::record_span_dropped();
            }
            Err(mpsc::error::TrySendError::Closed(span)) => {
                tracing::debug!(name = %span.name, "Span processor stopped, dropping span");
                metrics::record_span_dropped();
            }
        }
    }
}

impl BatchHandle {
    /// Flush everything queued so far and stop the worker.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(error) = self.worker.await {
            tracing::error!(%error, "Span batch worker terminated abnormally");
        }
    }
}

async fn run_worker<E: SpanExporter>(
    exporter: E,
    mut rx: mpsc::Receiver<SpanData>,
    mut stop: oneshot::Receiver<()>,
    config: BatchConfig,
) {
    let max_batch_size = config.max_batch_size.max(1);
    let mut pending = Vec::with_capacity(max_batch_size);
    let mut ticker = time::interval(config.batch_timeout.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            received = rx.recv() => match received {
                Some(span) => {
                    pending.push(span);
                    if pending.len() >= max_batch_size {
                        flush(&exporter, &mut pending).await;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => flush(&exporter, &mut pending).await,
            _ = &mut stop => {
                rx.close();
                while let Some(span) = rx.recv().await {
                    pending.push(span);
                }
                break;
            }
        }
    }

    flush(&exporter, &mut pending).await;
    tracing::debug!(exporter = exporter.name(), "Span batch processor stopped");
}

async fn flush<E: SpanExporter>(exporter: &E, pending: &mut Vec<SpanData>) {
    if pending.is_empty() {
        return;
    }

    let batch = mem::take(pending);
    let count = batch.len();
    match exporter.export(batch).await {
        Ok(()) => metrics::record_spans_exported(count),
        Err(error) => {
            tracing::warn!(exporter = exporter.name(), %error, count, "Span export failed");
            metrics::record_span_export_error();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::context::{SpanId, TraceContext, TraceFlags, TraceId};
    use crate::observability::span::{ActiveSpan, SpanKind};
    use std::sync::Arc;

    /// Records exported batches for inspection.
    #[derive(Clone, Default)]
    struct RecordingExporter {
        batches: Arc<Mutex<Vec<Vec<SpanData>>>>,
    }

    impl RecordingExporter {
        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    impl SpanExporter for RecordingExporter {
        async fn export(&self, batch: Vec<SpanData>) -> Result<(), ExportError> {
            self.batches.lock().unwrap().push(batch);
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn finish_span(sink: Arc<dyn SpanSink>, name: &str) {
        let context = TraceContext::new(TraceId::random(), SpanId::random(), TraceFlags::SAMPLED);
        let mut span = ActiveSpan::start(context, None, "test", name.into(), SpanKind::Internal, sink);
        span.end();
    }

    #[test]
    fn test_in_memory_sink_filters_by_name() {
        let sink = Arc::new(InMemorySink::new());
        finish_span(sink.clone(), "a");
        finish_span(sink.clone(), "b");
        finish_span(sink.clone(), "a");

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.spans_named("a").len(), 2);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_flushes_when_batch_is_full() {
        let exporter = RecordingExporter::default();
        let config = BatchConfig {
            max_batch_size: 2,
            batch_timeout: Duration::from_secs(3600),
            max_queue_size: 16,
        };
        let (processor, handle) = BatchSpanProcessor::spawn(exporter.clone(), config);
        let sink: Arc<dyn SpanSink> = Arc::new(processor);

        for _ in 0..5 {
            finish_span(sink.clone(), "op");
        }
        handle.shutdown().await;

        assert_eq!(exporter.batch_sizes(), vec![2, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_on_timeout() {
        let exporter = RecordingExporter::default();
        let config = BatchConfig {
            max_batch_size: 100,
            batch_timeout: Duration::from_secs(5),
            max_queue_size: 16,
        };
        let (processor, handle) = BatchSpanProcessor::spawn(exporter.clone(), config);
        let sink: Arc<dyn SpanSink> = Arc::new(processor);

        finish_span(sink.clone(), "op");
        time::sleep(Duration::from_secs(6)).await;
        assert_eq!(exporter.batch_sizes(), vec![1]);

        handle.shutdown().await;
        assert_eq!(exporter.batch_sizes(), vec![1]);
    }

    #[tokio::test]
    async fn test_spans_after_shutdown_are_dropped() {
        let exporter = RecordingExporter::default();
        let (processor, handle) = BatchSpanProcessor::spawn(exporter.clone(), BatchConfig::default());
        let sink: Arc<dyn SpanSink> = Arc::new(processor);

        finish_span(sink.clone(), "before");
        handle.shutdown().await;
        finish_span(sink.clone(), "after");

        let batches = exporter.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].name, "before");
    }

    #[tokio::test]
    async fn test_builtin_exporters_accept_batches() {
        let sink = Arc::new(InMemorySink::new());
        finish_span(sink.clone(), "op");

        assert!(LogExporter.export(sink.spans()).await.is_ok());
        assert!(StdoutExporter.export(sink.spans()).await.is_ok());
        assert!(NullExporter.export(sink.spans()).await.is_ok());
    }
}
