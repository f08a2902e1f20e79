//! Paced HTTP admission with distributed tracing.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pacing;

pub use config::GatewayConfig;
pub use error::{GatewayError, RateBudgetError};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use pacing::{PacedLimiter, RateBudget};
