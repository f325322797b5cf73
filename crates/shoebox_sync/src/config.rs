//! Backoff policy for the network driver.
//!
//! The driver keeps one backoff per [`OpKind`](crate::OpKind): after a
//! retryable failure the whole kind waits, so a flaky upload does not hold
//! back downloads.

use rand::Rng;
use std::time::Duration;

/// How long a kind backs off after consecutive failures, and when an
/// operation is given up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Consecutive failures after which the staged operation is dropped.
    pub max_attempts: u32,
    /// Wait after the first failure.
    pub first_backoff: Duration,
    /// Cap on the wait, before jitter.
    pub max_backoff: Duration,
    /// Factor applied to the wait for each further failure.
    pub growth: f64,
    /// Fraction of the wait added at random, in `0.0..=1.0`. Zero disables
    /// jitter.
    pub jitter: f64,
}

impl Default for RetryConfig {
    /// Eight attempts, starting at two seconds and doubling up to ten
    /// minutes, with a quarter of jitter.
    fn default() -> Self {
        Self::new(8)
    }
}

impl RetryConfig {
    /// Default backoff giving up after `max_attempts` failures.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            first_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(600),
            growth: 2.0,
            jitter: 0.25,
        }
    }

    /// Drops an operation on its first failure.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            first_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            growth: 1.0,
            jitter: 0.0,
        }
    }

    /// Sets the wait after the first failure.
    pub fn with_first_backoff(mut self, wait: Duration) -> Self {
        self.first_backoff = wait;
        self
    }

    /// Sets the cap on the wait.
    pub fn with_max_backoff(mut self, wait: Duration) -> Self {
        self.max_backoff = wait;
        self
    }

    /// Sets the per-failure growth factor.
    pub fn with_growth(mut self, growth: f64) -> Self {
        self.growth = growth;
        self
    }

    /// Sets the jitter fraction, clamped to `0.0..=1.0`.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction.clamp(0.0, 1.0);
        self
    }

    /// True once `failures` consecutive failures exhaust the attempts.
    pub fn gives_up_after(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }

    /// Wait before the kind is tried again after `failures` consecutive
    /// failures. Zero failures means no wait.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let wait = (self.first_backoff.as_secs_f64() * self.growth.powi(exponent))
            .min(self.max_backoff.as_secs_f64());
        if self.jitter > 0.0 && wait > 0.0 {
            let extra = wait * self.jitter * rand::thread_rng().gen_range(0.0..1.0);
            Duration::from_secs_f64(wait + extra)
        } else {
            Duration::from_secs_f64(wait)
        }
    }
}
