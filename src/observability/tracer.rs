//! Span factory with parent-based sampling.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::observability::context::{SpanId, TraceContext, TraceId};
use crate::observability::sink::SpanSink;
use crate::observability::span::{ActiveSpan, SpanKind};

/// Sampling decision for new spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampler {
    /// Follow a valid parent's sampled flag; sample new roots.
    #[default]
    ParentBased,
    AlwaysOn,
    AlwaysOff,
}

impl Sampler {
    pub fn should_sample(&self, parent: &TraceContext) -> bool {
        match self {
            Sampler::ParentBased if parent.is_valid() => parent.is_sampled(),
            Sampler::ParentBased | Sampler::AlwaysOn => true,
            Sampler::AlwaysOff => false,
        }
    }
}

/// Creates spans under one instrumentation scope and routes them to a sink.
#[derive(Clone)]
pub struct Tracer {
    scope: Arc<str>,
    sampler: Sampler,
    sink: Arc<dyn SpanSink>,
}

impl Tracer {
    pub fn new(scope: &str, sink: Arc<dyn SpanSink>) -> Self {
        Self {
            scope: Arc::from(scope),
            sampler: Sampler::default(),
            sink,
        }
    }

    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Start a child of `parent`, returning the child's context and its handle.
    ///
    /// The child keeps the parent's trace id when it has one; a parent with
    /// no span (a root context) contributes its trace id but no parent link.
    pub fn start_span(
        &self,
        parent: &TraceContext,
        name: impl Into<String>,
        kind: SpanKind,
    ) -> (TraceContext, ActiveSpan) {
        let trace_id = if parent.trace_id.is_valid() {
            parent.trace_id
        } else {
            TraceId::random()
        };
        let parent_span_id = parent.span_id.is_valid().then_some(parent.span_id);
        let flags = parent
            .flags
            .with_sampled(self.sampler.should_sample(parent));
        let context = TraceContext::new(trace_id, SpanId::random(), flags);

        let span = ActiveSpan::start(
            context,
            parent_span_id,
            &self.scope,
            name.into(),
            kind,
            self.sink.clone(),
        );
        (context, span)
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("scope", &self.scope)
            .field("sampler", &self.sampler)
            .finish_non_exhaustive()
    }
}
