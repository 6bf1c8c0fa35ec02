//! Retry with deterministic exponential backoff.
//!
//! The wait after failed attempt `i` (0-based) is
//! `base_backoff * 2^i + jitter_step * i`. The jitter term is a pure function
//! of the attempt index so retry timing is reproducible in tests.
//!
//! # Sleep injection
//! Waiting goes through the `Sleeper` trait rather than calling
//! `std::thread::sleep` directly. Production code uses `ThreadSleeper`;
//! tests pass a recorder and never block.

use std::time::Duration;

use crate::model::FetchError;

/// Largest exponent applied to the base backoff.
const MAX_BACKOFF_EXPONENT: u32 = 16;

// ---------------------------------------------------------------------------
// Sleeping
// ---------------------------------------------------------------------------

/// Blocks the calling thread between retry attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per source, including the first. Never zero.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    /// Added once per attempt index.
    pub jitter_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            jitter_step: Duration::from_millis(100),
        }
    }
}

/// Result of one retried operation plus how many attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub result: Result<T, FetchError>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration, jitter_step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
            jitter_step,
        }
    }

    /// Wait to apply after failed attempt `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
        let base = self
            .base_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(Duration::MAX);
        let jitter = self
            .jitter_step
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX);
        base.checked_add(jitter).unwrap_or(Duration::MAX)
    }

    /// Sum of all waits a permanently failing operation incurs.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.backoff_delay(attempt))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }

    /// Upper bound for one source's retry sequence when every attempt runs
    /// into `timeout`. Callers imposing an outer deadline size it from this.
    pub fn worst_case_duration(&self, timeout: Duration) -> Duration {
        let requests = timeout
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX);
        self.total_backoff().saturating_add(requests)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` attempts have been made. `on_failure` sees every failed
    /// attempt before the wait.
    pub fn run<T, S, F, L>(&self, sleeper: &S, mut op: F, mut on_failure: L) -> RetryOutcome<T>
    where
        S: Sleeper + ?Sized,
        F: FnMut() -> Result<T, FetchError>,
        L: FnMut(u32, &FetchError),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt + 1,
                    };
                }
                Err(err) => {
                    on_failure(attempt, &err);
                    let last_attempt = attempt + 1 >= max_attempts;
                    if last_attempt || !err.is_retryable() {
                        return RetryOutcome {
                            result: Err(err),
                            attempts: attempt + 1,
                        };
                    }
                    sleeper.sleep(self.backoff_delay(attempt));
                    attempt += 1;
                }
            }
        }
    }
}
