//! Convergence poller
//!
//! Relay side effects (membership changes, deletions, derived list events) become
//! visible asynchronously. `poll_until` re-evaluates a predicate on a fixed interval
//! until it holds or the deadline passes, and reports the latter as a distinct
//! `ConvergenceTimeout` so "too slow" never reads like "protocol violated".

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::Timeouts;
use crate::error::ConvergenceTimeout;

/// Interval and deadline for a convergence poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub deadline: Duration,
}

impl PollSettings {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    pub fn with_deadline(self, deadline: Duration) -> Self {
        Self { deadline, ..self }
    }
}

impl From<&Timeouts> for PollSettings {
    fn from(timeouts: &Timeouts) -> Self {
        Self::new(timeouts.poll_interval, timeouts.convergence)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&Timeouts::default())
    }
}

/// Evaluate `predicate` until it returns `Ok(true)` or the deadline elapses
///
/// The first evaluation happens immediately. Between attempts the poller sleeps for
/// the interval, clipped to the time remaining, and always evaluates once more at the
/// deadline before giving up. Errors from the predicate abort the poll unchanged.
pub async fn poll_until<F, Fut, E>(
    description: &str,
    settings: PollSettings,
    mut predicate: F,
) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: From<ConvergenceTimeout>,
{
    let started = Instant::now();
    let deadline = started + settings.deadline;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if predicate().await? {
            debug!(
                "Converged on {} after {} attempts ({:?})",
                description,
                attempts,
                started.elapsed()
            );
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(
                "Gave up waiting for {} after {} attempts",
                description, attempts
            );
            return Err(ConvergenceTimeout {
                description: description.to_string(),
                deadline: settings.deadline,
                attempts,
            }
            .into());
        }

        sleep(settings.interval.min(deadline - now)).await;
    }
}
