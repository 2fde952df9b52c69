//! Retry with deterministic exponential backoff

use magpie_core::Result;
use std::time::Duration;
use tracing::warn;

/// How a retry loop waits between attempts.
///
/// Injectable so tests can count sleeps instead of taking them.
pub trait Sleeper: Send + Sync {
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// The real sleeper.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Deterministic exponential backoff policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Wait after the first failure.
    pub base: Duration,
    /// Backoff growth per further failure.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 4,
            base: Duration::from_millis(10),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Wait before attempt `attempt + 1` (attempts count from 0).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base * self.multiplier.saturating_pow(attempt)
    }

    /// Run `op`, retrying transient errors with backoff.
    ///
    /// Non-transient errors return immediately; a transient error on
    /// the final attempt is returned as-is.
    pub fn run<T>(
        &self,
        sleeper: &dyn Sleeper,
        what: &str,
        mut op: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.attempts => {
                    let wait = self.backoff(attempt);
                    warn!(%err, what, attempt, ?wait, "transient failure, retrying");
                    sleeper.sleep(wait);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
