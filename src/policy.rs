//! Explicit retry policy.
//!
//! A [`RetryPolicy`] bundles the attempt budget, the backoff schedule and the
//! predicate deciding whether an error is worth another attempt. The same
//! policy object drives directory refresh, the price feed and the storage
//! retry fallback.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempt budget plus exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: usize,
    /// Delay after the first failure.
    pub initial_backoff: Duration,
    /// Upper bound on any delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build a policy from configuration.
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier.max(1.0),
            jitter: true,
        }
    }

    /// A policy that tries exactly once.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Override the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff_for(&self, attempt: usize) -> Duration {
        if attempt == 0 || self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_backoff.as_secs_f64());
        let jittered = if self.jitter {
            capped * (1.0 + rand::thread_rng().gen_range(0.0..0.1))
        } else {
            capped
        };
        Duration::from_secs_f64(jittered.min(self.max_backoff.as_secs_f64()))
    }

    /// Run `op` until it succeeds, `should_retry` refuses the error, or the
    /// attempt budget is spent. Returns the last error on failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt.
    pub async fn run<T, F, Fut, P>(&self, label: &str, mut op: F, should_retry: P) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{label} succeeded on attempt {attempt}");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.max_attempts && should_retry(&e) => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "{label} attempt {attempt}/{} failed: {e}; retrying in {delay:?}",
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Retry predicate accepting transient network failures only.
#[must_use]
pub fn is_transient(error: &Error) -> bool {
    matches!(error, Error::Network(_))
}
