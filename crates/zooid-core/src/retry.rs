//! Retry-with-backoff combinator
//!
//! One bounded retry primitive for scenario-level retry policies such as re-fetching a
//! rotated invite claim. Which errors are worth retrying is decided by the caller.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential { factor: u32 },
}

/// Bounded retry schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; values below 1 behave as 1
    pub attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(attempts: u32, delay: Duration, factor: u32) -> Self {
        Self {
            attempts,
            delay,
            backoff: Backoff::Exponential { factor },
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { factor } => self
                .delay
                .saturating_mul(factor.saturating_pow(attempt.saturating_sub(1))),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out
///
/// `op` receives the 1-based attempt number. The last error is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    is_retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_retryable(&e) => {
                let delay = policy.delay_after(attempt);
                debug!(
                    "Attempt {}/{} failed, retrying in {:?}",
                    attempt, attempts, delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
