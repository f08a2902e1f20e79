//! Rate-limit middleware driven in-process through `tower::ServiceExt`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header::HeaderName, HeaderValue, Request, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use rate_pacer::http::middleware::rate_limit::RATE_LIMIT_SPAN;
use rate_pacer::http::middleware::{rate_limit_middleware, RateLimitState};
use rate_pacer::http::HandlerError;
use rate_pacer::observability::{
    AttributeValue, InMemorySink, RequestContext, SpanData, SpanStatus, Tracer,
};
use rate_pacer::PacedLimiter;
use serde_json::{json, Value};
use tower::ServiceExt;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};

struct Harness {
    sink: Arc<InMemorySink>,
    limiter: Arc<PacedLimiter>,
}

impl Harness {
    fn new(rps: f64) -> Self {
        Self {
            sink: Arc::new(InMemorySink::new()),
            limiter: Arc::new(PacedLimiter::per_second(rps).unwrap()),
        }
    }

    /// Put `routes` behind the rate-limit middleware.
    fn wrap(&self, routes: Router) -> Router {
        let state = RateLimitState::new(
            self.limiter.clone(),
            Tracer::new("middleware-test", self.sink.clone()),
        );
        routes.route_layer(middleware::from_fn_with_state(state, rate_limit_middleware))
    }

    fn only_span(&self) -> SpanData {
        let spans = self.sink.spans_named(RATE_LIMIT_SPAN);
        assert_eq!(spans.len(), 1, "expected exactly one middleware span");
        spans.into_iter().next().unwrap()
    }
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn echo_context(Extension(context): Extension<RequestContext>) -> Json<Value> {
    let baggage: serde_json::Map<String, Value> = context
        .baggage
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(v)))
        .collect();
    Json(json!({
        "trace_id": context.trace.trace_id.to_string(),
        "span_id": context.trace.span_id.to_string(),
        "baggage": baggage,
    }))
}

async fn failing_handler() -> Result<&'static str, HandlerError> {
    Err(HandlerError::new(StatusCode::SERVICE_UNAVAILABLE, "inventory unavailable"))
}

async fn bare_500() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn panicking_handler() -> &'static str {
    panic!("boom")
}

async fn custom_response() -> impl IntoResponse {
    (
        StatusCode::CREATED,
        [(HeaderName::from_static("x-handler"), HeaderValue::from_static("yes"))],
        "made",
    )
}

#[tokio::test]
async fn test_handler_sees_child_context_and_rate_baggage() {
    let harness = Harness::new(100.0);
    let app = harness.wrap(Router::new().route("/echo", get(echo_context)));

    let request = Request::builder()
        .uri("/echo")
        .header("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
        .header("baggage", "tenant=acme")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let span = harness.only_span();
    assert_eq!(body["trace_id"], "4bf92f3577b34da6a3ce929d0e0e4736");
    assert_eq!(body["span_id"], span.span_id.to_string());
    assert_eq!(body["baggage"]["tenant"], "acme");
    assert_eq!(body["baggage"]["rate_limit"], "100");
}

#[tokio::test]
async fn test_response_passes_through_untouched() {
    let harness = Harness::new(100.0);
    let app = harness.wrap(Router::new().route("/custom", get(custom_response)));

    let response = app.oneshot(get_request("/custom")).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-handler"], "yes");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"made");

    let span = harness.only_span();
    assert_eq!(span.status, SpanStatus::Ok);
    assert_eq!(span.attribute("http.status_code"), Some(&AttributeValue::Int(201)));
}

#[tokio::test]
async fn test_handler_error_marks_span_failed() {
    let harness = Harness::new(100.0);
    let app = harness.wrap(Router::new().route("/fail", get(failing_handler)));

    let response = app.oneshot(get_request("/fail")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"], "inventory unavailable");

    let span = harness.only_span();
    assert_eq!(span.status, SpanStatus::Error);
    assert_eq!(
        span.attribute("error.message").and_then(AttributeValue::as_str),
        Some("inventory unavailable")
    );
}

#[tokio::test]
async fn test_plain_server_error_marks_span_failed() {
    let harness = Harness::new(100.0);
    let app = harness.wrap(Router::new().route("/oops", get(bare_500)));

    let response = app.oneshot(get_request("/oops")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(harness.only_span().status, SpanStatus::Error);
}

#[tokio::test]
async fn test_client_error_status_without_failure_is_ok() {
    let harness = Harness::new(100.0);
    let app = harness.wrap(Router::new().route("/gone", get(not_found_handler)));

    let response = app.oneshot(get_request("/gone")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let span = harness.only_span();
    assert_eq!(span.status, SpanStatus::Ok);
    assert_eq!(span.attribute("http.status_code"), Some(&AttributeValue::Int(404)));
}

#[tokio::test]
async fn test_panicking_handler_is_recorded_then_caught() {
    let harness = Harness::new(100.0);
    let app = harness
        .wrap(Router::new().route("/panic", get(panicking_handler)))
        .layer(CatchPanicLayer::new());

    let response = app.oneshot(get_request("/panic")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let span = harness.only_span();
    assert_eq!(span.status, SpanStatus::Error);
    assert_eq!(
        span.attribute("error.message").and_then(AttributeValue::as_str),
        Some("handler panicked: boom")
    );
    assert_eq!(span.attribute("ratelimit.admitted"), Some(&AttributeValue::Bool(true)));
}

#[tokio::test(start_paused = true)]
#[allow(deprecated)]
async fn test_timeout_while_waiting_cancels_admission() {
    let harness = Harness::new(1.0);
    let app = harness
        .wrap(Router::new().route("/slow", get(|| async { "ok" })))
        .layer(TimeoutLayer::new(Duration::from_millis(100)));
    let start = tokio::time::Instant::now();

    let first = app.clone().oneshot(get_request("/slow")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    harness.sink.clear();

    let second = app.oneshot(get_request("/slow")).await.unwrap();
    assert_eq!(second.status(), StatusCode::REQUEST_TIMEOUT);

    let span = harness.only_span();
    assert_eq!(span.attribute("ratelimit.admitted"), Some(&AttributeValue::Bool(false)));
    assert_eq!(span.status, SpanStatus::Unset);
    assert_eq!(span.attribute("ratelimit.wait_ms"), None);

    // The abandoned slot was never recorded.
    assert_eq!(harness.limiter.take().await, start + Duration::from_secs(1));
}

#[tokio::test]
async fn test_each_request_emits_one_span() {
    let harness = Harness::new(1000.0);
    let app = harness.wrap(Router::new().route("/echo", get(echo_context)));

    for _ in 0..4 {
        let response = app.clone().oneshot(get_request("/echo")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let spans = harness.sink.spans_named(RATE_LIMIT_SPAN);
    assert_eq!(spans.len(), 4);
    let mut ids: Vec<_> = spans.iter().map(|s| s.span_id.as_u64()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_admission_timestamp_reflects_paced_wait() {
    let harness = Harness::new(1.0);
    let app = harness.wrap(Router::new().route("/slow", get(|| async { "ok" })));

    let first = app.clone().oneshot(get_request("/slow")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    harness.sink.clear();

    let second = app.oneshot(get_request("/slow")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let span = harness.only_span();
    assert_eq!(
        span.attribute("ratelimit.wait_ms").and_then(AttributeValue::as_f64),
        Some(1000.0)
    );
    let admitted_at = span
        .attribute("ratelimit.admitted_at_unix_nanos")
        .and_then(AttributeValue::as_i64)
        .unwrap() as u64;
    let offset = Duration::from_nanos(admitted_at.saturating_sub(span.start_unix_nanos));
    assert!(
        offset >= Duration::from_millis(995) && offset <= Duration::from_millis(1005),
        "admission stamped {offset:?} after span start"
    );
}
