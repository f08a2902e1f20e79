//! Rate-limit middleware: pace, trace, annotate.
//!
//! # Per-request sequence
//! ```text
//! Received
//!   → ContextExtracted   (traceparent/baggage, never fails)
//!   → SpanStarted        ("rate-limit", child of upstream)
//!   → Admitted           (PacedLimiter::acquire, the only suspension point)
//!   → HandlerInvoked     (RequestContext + rate_limit baggage in extensions)
//!   → SpanClosed         (status from response, failure detail or panic)
//!   → Responded          (handler response returned untouched)
//! ```
//!
//! If the request future is dropped while waiting for admission (timeout,
//! client disconnect) the span is still closed by `ActiveSpan`'s drop, with
//! `ratelimit.admitted = false` and an unset status.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::time::Instant as MonotonicInstant;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use futures_util::FutureExt;

use crate::http::error::HandlerFailure;
use crate::observability::{metrics, propagation, RequestContext, SpanKind, SpanStatus, Tracer};
use crate::pacing::PacedLimiter;

pub const RATE_LIMIT_SPAN: &str = "rate-limit";
pub const RATE_LIMIT_BAGGAGE_KEY: &str = "rate_limit";

const X_REQUEST_ID: &str = "x-request-id";

/// State for the rate-limit middleware.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    limiter: Arc<PacedLimiter>,
    tracer: Tracer,
}

impl RateLimitState {
    pub fn new(limiter: Arc<PacedLimiter>, tracer: Tracer) -> Self {
        Self { limiter, tracer }
    }

    pub fn limiter(&self) -> &Arc<PacedLimiter> {
        &self.limiter
    }
}

/// Middleware function pacing every request through the shared limiter.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    // One paired clock reading; admission time is projected from it.
    let anchor = (SystemTime::now(), MonotonicInstant::now());
    let upstream = propagation::extract(request.headers());
    let (trace, mut span) = state
        .tracer
        .start_span(&upstream.trace, RATE_LIMIT_SPAN, SpanKind::Server);

    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let budget = state.limiter.budget();

    span.set_attribute("http.method", method.as_str());
    span.set_attribute("http.path", path.as_str());
    if let Some(id) = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
    {
        span.set_attribute("http.request_id", id);
    }
    span.set_attribute("ratelimit.budget_rps", budget.rps());
    span.set_attribute("ratelimit.admitted", false);

    let admission = state.limiter.acquire().await;

    let admitted_at = wall_clock_nanos(anchor, admission.at);
    span.set_attribute("ratelimit.admitted", true);
    span.set_attribute("ratelimit.admitted_at_unix_nanos", admitted_at);
    span.set_attribute("ratelimit.wait_ms", admission.waited.as_secs_f64() * 1e3);
    if let Some(gap) = admission.since_previous {
        span.set_attribute("ratelimit.since_previous_ms", gap.as_secs_f64() * 1e3);
    }
    metrics::record_admission(&admission);
    tracing::debug!(
        trace_id = %trace.trace_id,
        waited = ?admission.waited,
        since_previous = ?admission.since_previous,
        "Request admitted"
    );

    let context = RequestContext::new(trace, upstream.baggage)
        .with_baggage(RATE_LIMIT_BAGGAGE_KEY, budget.to_string());
    request.extensions_mut().insert(context);

    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            span.record_error(panic_message(payload.as_ref()));
            span.set_attribute("http.status_code", 500u16);
            span.end();
            metrics::record_request(&method, 500, start);
            panic::resume_unwind(payload);
        }
    };

    let status = response.status();
    span.set_attribute("http.status_code", status.as_u16());
    if let Some(HandlerFailure(detail)) = response.extensions().get::<HandlerFailure>() {
        span.record_error(detail.clone());
    } else if status.is_server_error() {
        span.record_error(format!("handler responded with {status}"));
    } else {
        span.set_status(SpanStatus::Ok, None);
    }
    span.end();
    metrics::record_request(&method, status.as_u16(), start);

    response
}

/// Unix nanoseconds of monotonic instant `at`, projected from `anchor`.
fn wall_clock_nanos(anchor: (SystemTime, MonotonicInstant), at: MonotonicInstant) -> u64 {
    let (wall, mono) = anchor;
    let at_wall = wall
        .checked_add(at.saturating_duration_since(mono))
        .unwrap_or(wall);
    at_wall
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}
