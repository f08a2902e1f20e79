//! Span lifecycle.
//!
//! An [`ActiveSpan`] is a live handle: attributes and status may change until
//! [`ActiveSpan::end`] is called, after which it hands an immutable
//! [`SpanData`] to the sink exactly once. Dropping an un-ended span ends it,
//! so the record is emitted on every exit path, including unwinding and
//! cancelled futures.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::observability::context::{SpanId, TraceContext, TraceId};
use crate::observability::sink::SpanSink;

/// Attribute value types for span metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<u16> for AttributeValue {
    fn from(value: u16) -> Self {
        AttributeValue::Int(value.into())
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        AttributeValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// Span completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

/// Span kind, as in OpenTelemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Handles an inbound request.
    Server,
    /// In-process operation.
    Internal,
}

/// A finished span as handed to the sink.
#[derive(Debug, Clone, Serialize)]
pub struct SpanData {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Instrumentation scope that produced the span.
    pub scope: String,
    pub name: String,
    pub kind: SpanKind,
    pub start_unix_nanos: u64,
    pub end_unix_nanos: u64,
    pub status: SpanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl SpanData {
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.end_unix_nanos.saturating_sub(self.start_unix_nanos))
    }
}

/// Live span handle. See the module docs for lifecycle rules.
pub struct ActiveSpan {
    context: TraceContext,
    data: Option<SpanData>,
    sink: Arc<dyn SpanSink>,
}

impl ActiveSpan {
    pub(crate) fn start(
        context: TraceContext,
        parent_span_id: Option<SpanId>,
        scope: &str,
        name: String,
        kind: SpanKind,
        sink: Arc<dyn SpanSink>,
    ) -> Self {
        let now = unix_nanos(SystemTime::now());
        let data = SpanData {
            trace_id: context.trace_id,
            span_id: context.span_id,
            parent_span_id,
            scope: scope.to_string(),
            name,
            kind,
            start_unix_nanos: now,
            end_unix_nanos: now,
            status: SpanStatus::Unset,
            status_message: None,
            attributes: BTreeMap::new(),
        };

        Self {
            context,
            data: Some(data),
            sink,
        }
    }

    /// The context this span propagates to its children.
    pub fn context(&self) -> TraceContext {
        self.context
    }

    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Ignored once the span has ended.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        if let Some(data) = self.data.as_mut() {
            data.attributes.insert(key.into(), value.into());
        }
    }

    /// Ignored once the span has ended.
    pub fn set_status(&mut self, status: SpanStatus, message: Option<String>) {
        if let Some(data) = self.data.as_mut() {
            data.status = status;
            data.status_message = message;
        }
    }

    /// Mark the span failed and record `message` as `error.message`.
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.set_attribute("error.message", message.clone());
        self.set_status(SpanStatus::Error, Some(message));
    }

    /// Finish the span and forward it to the sink. Later calls do nothing.
    pub fn end(&mut self) {
        let Some(mut data) = self.data.take() else {
            return;
        };
        data.end_unix_nanos = unix_nanos(SystemTime::now()).max(data.start_unix_nanos);

        if self.context.is_sampled() {
            self.sink.record(data);
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        if self.data.is_some() && std::thread::panicking() {
            self.record_error("span dropped while panicking");
        }
        self.end();
    }
}

impl fmt::Debug for ActiveSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSpan")
            .field("context", &self.context)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
