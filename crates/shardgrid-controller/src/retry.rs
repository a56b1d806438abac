//! Bounded retry on optimistic-concurrency conflicts.
//!
//! Every controller mutation is a read-decide-commit attempt. When the
//! commit loses a race the attempt is discarded and re-run from a fresh read
//! after an exponentially growing, fully jittered pause.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ControllerError, ControllerResult};

/// Retry bound and backoff shape for conflicting commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff ceiling after the first conflict, in milliseconds.
    pub base_backoff_ms: u64,
    /// Upper bound for the backoff ceiling, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 10,
            max_backoff_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately (for tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Backoff ceiling after the `attempt`-th conflict (1-based): doubles
    /// per attempt, capped at `max_backoff_ms`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let ms = self
            .base_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Pause before the next attempt: uniform in `[0, ceiling(attempt)]`.
    pub fn backoff<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        Duration::from_millis(rng.random_range(0..=ceiling))
    }
}

/// Run `attempt` until it returns anything other than a version conflict.
///
/// `attempt` receives the 1-based attempt number. After `max_attempts`
/// conflicts the loop gives up with [`ControllerError::ConflictRetriesExhausted`].
pub(crate) async fn retry_on_conflict<T, F>(
    policy: &RetryPolicy,
    key: &str,
    mut attempt: F,
) -> ControllerResult<T>
where
    F: FnMut(u32) -> ControllerResult<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut n = 1;
    loop {
        match attempt(n) {
            Err(err) if err.is_conflict() => {
                if n >= max_attempts {
                    warn!(%key, attempts = n, "retry bound exhausted on version conflicts");
                    return Err(ControllerError::ConflictRetriesExhausted {
                        key: key.to_string(),
                        attempts: n,
                    });
                }
                let delay = policy.backoff(n, &mut rand::rng());
                debug!(%key, attempt = n, ?delay, error = %err, "version conflict, retrying");
                tokio::time::sleep(delay).await;
                n += 1;
            }
            other => return other,
        }
    }
}
