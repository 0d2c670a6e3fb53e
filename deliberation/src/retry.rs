//! Bounded retry with exponential backoff for fallible provider calls.
//!
//! Only transient failures (timeouts, rate limits, transient I/O) are
//! retried; permanent failures propagate immediately. Exhausting the
//! attempt budget converts the last transient error into a permanent
//! `Exhausted` error scoped to the failing unit.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ProviderError;

/// Retry policy: attempt count and backoff curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt, in seconds.
    pub initial_backoff_secs: f64,
    /// Multiplicative backoff factor per subsequent attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    // 3 attempts, 2.0s → 4.0s between them.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_secs: 2.0,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy with no sleep between attempts, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_secs: 0.0,
            backoff_multiplier: 1.0,
        }
    }

    /// Backoff duration after the given failed attempt (1-indexed).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let secs = self.initial_backoff_secs * self.backoff_multiplier.powi(exp);
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Wraps a unit of work with bounded retries.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` up to the policy's attempt budget.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff_for(attempt);
                    warn!(
                        label,
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(ProviderError::Exhausted {
                        attempts: self.policy.max_attempts,
                        last: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
