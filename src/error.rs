//! Crate-level error types.
//!
//! # Taxonomy
//! - `RateBudgetError`: invalid requests-per-second budget. Fatal at startup.
//! - `GatewayError`: everything `main` can fail on before or while serving.
//!
//! Request-scoped failures (malformed trace headers, handler errors,
//! cancellation while paced) never surface here; they are contained in the
//! request that produced them.

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::config::validation::ValidationError;

/// A requests-per-second value that cannot drive a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RateBudgetError {
    #[error("rate budget must be positive, got {0}")]
    NonPositive(f64),

    #[error("rate budget must be a finite number")]
    NotFinite,

    #[error("rate budget {0} is too small to express as an interval")]
    TooSmall(f64),

    #[error("rate budget {0} is too large: interval rounds to zero")]
    TooLarge(f64),
}

/// Top-level error for process startup and the serve loop.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    RateBudget(#[from] RateBudgetError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("failed to initialise logging: {0}")]
    Logging(String),

    #[error("failed to initialise metrics exporter: {0}")]
    Metrics(String),
}

pub(crate) fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
