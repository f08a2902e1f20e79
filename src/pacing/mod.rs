//! Admission pacing subsystem.
//!
//! # Data Flow
//! ```text
//! --rps / rate_limit.requests_per_second
//!     → budget.rs (validate, derive interval = 1 / rps)
//!     → limiter.rs (PacedLimiter, one per process)
//!     → shared via Arc with the rate-limit middleware
//!
//! Per request:
//!     acquire() → wait for the next slot → Admission { at, waited, since_previous }
//! ```
//!
//! # Design Decisions
//! - Leak bucket, not token bucket: no burst credit accrues while idle
//! - The last admission timestamp is private to the limiter
//! - Abandoned waits leave no trace in the limiter state

pub mod budget;
pub mod limiter;

pub use budget::RateBudget;
pub use limiter::{Admission, PacedLimiter};
