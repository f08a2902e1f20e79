//! Leak-bucket admission limiter.
//!
//! # Algorithm
//! ```text
//! next_allowed = last_admitted + interval
//! now <  next_allowed → sleep until next_allowed, last_admitted = next_allowed
//! now >= next_allowed → admit now,               last_admitted = now
//! ```
//!
//! The read-compute-sleep-write sequence runs while holding an async mutex, so
//! concurrent callers are serialised onto distinct slots. A caller whose future
//! is dropped mid-sleep releases the lock without writing, leaving
//! `last_admitted` at the last completed admission.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{self, Instant};

use crate::error::RateBudgetError;
use crate::pacing::RateBudget;

/// Outcome of one completed admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Instant at which the caller was admitted.
    pub at: Instant,
    /// Time between calling `acquire` and admission, including lock contention.
    pub waited: Duration,
    /// Gap to the previous admission; `None` for the first one.
    pub since_previous: Option<Duration>,
}

/// Uniform-pacing limiter shared by every request in the process.
#[derive(Debug)]
pub struct PacedLimiter {
    budget: RateBudget,
    last_admitted: Mutex<Option<Instant>>,
}

impl PacedLimiter {
    pub fn new(budget: RateBudget) -> Self {
        Self {
            budget,
            last_admitted: Mutex::new(None),
        }
    }

    /// Validate `rps` and build a limiter; no limiter exists if validation fails.
    pub fn per_second(rps: f64) -> Result<Self, RateBudgetError> {
        RateBudget::new(rps).map(Self::new)
    }

    pub fn budget(&self) -> RateBudget {
        self.budget
    }

    pub fn interval(&self) -> Duration {
        self.budget.interval()
    }

    /// Wait for this caller's slot and return the admission instant.
    pub async fn take(&self) -> Instant {
        self.acquire().await.at
    }

    /// Wait for this caller's slot and return the full admission record.
    ///
    /// Cancel-safe: dropping the returned future before it completes records
    /// nothing.
    pub async fn acquire(&self) -> Admission {
        let requested = Instant::now();
        let mut last = self.last_admitted.lock().await;

        let now = Instant::now();
        let at = match *last {
            Some(prev) => match prev.checked_add(self.budget.interval()) {
                Some(next_allowed) if now < next_allowed => {
                    time::sleep_until(next_allowed).await;
                    next_allowed
                }
                Some(_) => now,
                // The next slot lies past the end of the clock; it never arrives.
                None => std::future::pending().await,
            },
            None => now,
        };

        let since_previous = last.map(|prev| at.duration_since(prev));
        *last = Some(at);

        Admission {
            at,
            waited: at.saturating_duration_since(requested),
            since_previous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_take_is_immediate() {
        let limiter = PacedLimiter::per_second(1.0).unwrap();
        let start = Instant::now();

        let admission = limiter.acquire().await;

        assert_eq!(admission.at, start);
        assert_eq!(admission.waited, Duration::ZERO);
        assert_eq!(admission.since_previous, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_takes_are_spaced() {
        let limiter = PacedLimiter::per_second(10.0).unwrap();
        let start = Instant::now();

        let t1 = limiter.take().await;
        let t2 = limiter.take().await;
        let second = limiter.acquire().await;

        assert_eq!(t1, start);
        assert_eq!(t2 - t1, Duration::from_millis(100));
        assert_eq!(second.at - t2, Duration::from_millis(100));
        assert_eq!(second.since_previous, Some(Duration::from_millis(100)));
        assert_eq!(second.waited, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_get_distinct_slots() {
        let limiter = Arc::new(PacedLimiter::per_second(1.0).unwrap());
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.take().await })
            })
            .collect();

        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap());
        }
        admitted.sort();

        let offsets: Vec<_> = admitted.iter().map(|t| *t - start).collect();
        assert_eq!(
            offsets,
            vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_period_grants_no_burst() {
        let limiter = PacedLimiter::per_second(10.0).unwrap();
        limiter.take().await;

        time::sleep(Duration::from_secs(5)).await;

        let a = limiter.take().await;
        let b = limiter.take().await;
        let c = limiter.take().await;
        assert_eq!(b - a, Duration::from_millis(100));
        assert_eq!(c - b, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_caller_resets_to_now() {
        let limiter = PacedLimiter::per_second(10.0).unwrap();
        limiter.take().await;

        time::sleep(Duration::from_millis(250)).await;
        let now = Instant::now();
        let admission = limiter.acquire().await;

        assert_eq!(admission.at, now);
        assert_eq!(admission.waited, Duration::ZERO);
        assert_eq!(admission.since_previous, Some(Duration::from_millis(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_records_nothing() {
        let limiter = PacedLimiter::per_second(1.0).unwrap();
        let first = limiter.take().await;

        let abandoned = time::timeout(Duration::from_millis(300), limiter.take()).await;
        assert!(abandoned.is_err());

        let next = limiter.take().await;
        assert_eq!(next - first, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extreme_slow_rate_waits_without_overflow() {
        let limiter = PacedLimiter::per_second(1e-18).unwrap();
        limiter.take().await;

        let second = time::timeout(Duration::from_secs(3600), limiter.take()).await;
        assert!(second.is_err());
    }
}
