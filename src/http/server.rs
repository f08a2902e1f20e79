//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the process-wide limiter from the validated rate budget
//! - Create the Axum router with the paced `GET /rate` route
//! - Wire up middleware (panic capture, access tracing, request id, timeout)
//! - Serve on a bound listener until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::error::RateBudgetError;
use crate::http::handlers::{self, HandlerState};
use crate::http::middleware::{rate_limit_middleware, RateLimitState};
use crate::observability::{SpanSink, Tracer};
use crate::pacing::{PacedLimiter, RateBudget};

pub const MIDDLEWARE_SCOPE: &str = "rate-limiter-middleware";
pub const SERVICE_SCOPE: &str = "rate-limiter-service";

/// HTTP server fronting the paced endpoint.
pub struct GatewayServer {
    router: Router,
    limiter: Arc<PacedLimiter>,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Build the server. Fails, constructing no limiter, on an invalid budget.
    pub fn new(config: GatewayConfig, sink: Arc<dyn SpanSink>) -> Result<Self, RateBudgetError> {
        let budget = RateBudget::per_second(config.rate_limit.requests_per_second)?;
        let limiter = Arc::new(PacedLimiter::new(budget));
        let sampler = config.telemetry.sampler;

        let rate_limit = RateLimitState::new(
            limiter.clone(),
            Tracer::new(MIDDLEWARE_SCOPE, sink.clone()).with_sampler(sampler),
        );
        let handler_state = HandlerState {
            tracer: Tracer::new(SERVICE_SCOPE, sink).with_sampler(sampler),
        };

        let router = Self::build_router(&config, rate_limit, handler_state);
        Ok(Self {
            router,
            limiter,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &GatewayConfig,
        rate_limit: RateLimitState,
        handler_state: HandlerState,
    ) -> Router {
        Router::new()
            .route("/rate", get(handlers::rate))
            .route_layer(middleware::from_fn_with_state(rate_limit, rate_limit_middleware))
            .with_state(handler_state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(CatchPanicLayer::new())
    }

    /// Router with every layer applied, for driving the service directly.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn limiter(&self) -> &Arc<PacedLimiter> {
        &self.limiter
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires or its sender is dropped.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            rps = %self.limiter.budget(),
            interval = ?self.limiter.interval(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
