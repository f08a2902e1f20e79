//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rate > 0, timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before any limiter is constructed

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("rate_limit.requests_per_second must be positive, got {0}")]
    InvalidRate(i64),

    #[error("{field} is not a valid socket address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("{0} must be greater than zero")]
    ZeroSize(&'static str),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.rate_limit.requests_per_second <= 0 {
        errors.push(ValidationError::InvalidRate(
            config.rate_limit.requests_per_second,
        ));
    }

    check_address(
        &mut errors,
        "listener.bind_address",
        &config.listener.bind_address,
    );
    if config.telemetry.metrics_enabled {
        check_address(
            &mut errors,
            "telemetry.metrics_address",
            &config.telemetry.metrics_address,
        );
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("timeouts.request_secs"));
    }
    if config.telemetry.batch_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("telemetry.batch_timeout_ms"));
    }
    if config.telemetry.max_batch_size == 0 {
        errors.push(ValidationError::ZeroSize("telemetry.max_batch_size"));
    }
    if config.telemetry.max_queue_size == 0 {
        errors.push(ValidationError::ZeroSize("telemetry.max_queue_size"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
