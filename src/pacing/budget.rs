//! Requests-per-second budget.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::RateBudgetError;

/// A validated requests-per-second budget and the spacing it implies.
///
/// Immutable once constructed; the only way to obtain one is through
/// [`RateBudget::new`], which rejects zero, negative and non-finite rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBudget {
    rps: f64,
    interval: Duration,
}

impl RateBudget {
    /// Validate `rps` and derive the minimum inter-admission interval.
    pub fn new(rps: f64) -> Result<Self, RateBudgetError> {
        if !rps.is_finite() {
            return Err(RateBudgetError::NotFinite);
        }
        if rps <= 0.0 {
            return Err(RateBudgetError::NonPositive(rps));
        }

        let interval =
            Duration::try_from_secs_f64(1.0 / rps).map_err(|_| RateBudgetError::TooSmall(rps))?;
        if interval.is_zero() {
            return Err(RateBudgetError::TooLarge(rps));
        }
        // The limiter adds the interval to monotonic instants.
        if Instant::now().checked_add(interval).is_none() {
            return Err(RateBudgetError::TooSmall(rps));
        }

        Ok(Self { rps, interval })
    }

    /// Budget from an integer flag or config value.
    pub fn per_second(rps: i64) -> Result<Self, RateBudgetError> {
        Self::new(rps as f64)
    }

    pub fn rps(&self) -> f64 {
        self.rps
    }

    /// Minimum spacing between two consecutive admissions.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl fmt::Display for RateBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rps.fract() == 0.0 && self.rps < i64::MAX as f64 {
            write!(f, "{}", self.rps as i64)
        } else {
            write!(f, "{}", self.rps)
        }
    }
}
