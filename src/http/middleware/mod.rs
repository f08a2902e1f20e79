//! Request interceptors.
//!
//! Each stage takes the request and the next stage and returns a response.
//! Stages are attached as axum/tower layers in `server.rs`.

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimitState};
