//! Terminal request handlers.

use axum::{
    extract::{MatchedPath, State},
    http::Method,
    Extension, Json,
};

use crate::http::middleware::rate_limit::RATE_LIMIT_BAGGAGE_KEY;
use crate::observability::{RequestContext, SpanKind, Tracer};

pub const RATE_RESPONSE_BODY: &str = "rate limiting test";
pub const RATE_HANDLER_SPAN: &str = "rate-limiting";

/// State shared by handlers.
#[derive(Debug, Clone)]
pub struct HandlerState {
    pub tracer: Tracer,
}

/// `GET /rate`: runs after admission; reports what the middleware propagated.
pub async fn rate(
    State(state): State<HandlerState>,
    Extension(context): Extension<RequestContext>,
    method: Method,
    path: MatchedPath,
) -> Json<&'static str> {
    let (_, mut span) = state
        .tracer
        .start_span(&context.trace, RATE_HANDLER_SPAN, SpanKind::Internal);
    span.set_attribute("method", method.as_str());
    span.set_attribute("path", path.as_str());

    if let Some(limit) = context.baggage.get(RATE_LIMIT_BAGGAGE_KEY) {
        tracing::info!(rate_limit = %limit, "Rate limit from baggage");
        span.set_attribute(RATE_LIMIT_BAGGAGE_KEY, limit);
    }

    span.end();
    Json(RATE_RESPONSE_BODY)
}
