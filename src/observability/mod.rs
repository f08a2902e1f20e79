//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound headers
//!     → propagation.rs (traceparent + baggage → RequestContext)
//!     → tracer.rs (child span, sampling decision)
//!     → span.rs (ActiveSpan: attributes, status, end-once)
//!     → sink.rs (SpanSink → batch worker → exporter)
//!
//! Alongside:
//!     → logging.rs (tracing-subscriber setup)
//!     → metrics.rs (admissions, request latency, exporter health)
//! ```
//!
//! # Design Decisions
//! - Context is passed explicitly as a value, never through thread-locals
//! - Span end is tied to drop, so every exit path emits the span
//! - The sink is injected; its transport is replaceable

pub mod context;
pub mod logging;
pub mod metrics;
pub mod propagation;
pub mod sink;
pub mod span;
pub mod tracer;

pub use context::{Baggage, RequestContext, SpanId, TraceContext, TraceFlags, TraceId};
pub use sink::{InMemorySink, SpanSink};
pub use span::{ActiveSpan, AttributeValue, SpanData, SpanKind, SpanStatus};
pub use tracer::{Sampler, Tracer};
