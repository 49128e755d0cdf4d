//! Bounded retry with exponential backoff.
//!
//! Every remote call in a run goes through [`RetryPolicy::run`] or
//! [`RetryPolicy::run_if`], which also stops at the first permanent error. The helper
//! never panics and never propagates: it returns a [`RetryOutcome`] that
//! records how many attempts were spent, and the caller decides whether an
//! exhausted outcome is a per-item failure.
//!
//! With the default policy the schedule is 1s, 2s, 4s, … between attempts,
//! capped at three attempts in total.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

/// Default attempt budget per remote call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the second attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// How often and how patiently a remote call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

/// Result of a retried call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Drop the attempt count and convert into a plain `Result`.
    ///
    /// # Errors
    ///
    /// Returns the last error when every attempt failed.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Succeeded { value, .. } => Ok(value),
            Self::Exhausted { error, .. } => Err(error),
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exp)
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. `label` only feeds the logs.
    pub fn run<T, E, F>(&self, label: &str, op: F) -> RetryOutcome<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        self.run_if(label, |_| true, op)
    }

    /// Like [`run`](Self::run), but stops at the first error for which
    /// `retryable` returns false.
    pub fn run_if<T, E, P, F>(&self, label: &str, retryable: P, mut op: F) -> RetryOutcome<T, E>
    where
        E: Display,
        P: Fn(&E) -> bool,
        F: FnMut(u32) -> Result<T, E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(op = label, attempt, "succeeded after retry");
                    }
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    };
                }
                Err(error) if !retryable(&error) => {
                    tracing::error!(
                        op = label,
                        attempts = attempt,
                        error = %error,
                        "not retryable, giving up"
                    );
                    return RetryOutcome::Exhausted {
                        error,
                        attempts: attempt,
                    };
                }
                Err(error) if attempt >= max_attempts => {
                    tracing::error!(
                        op = label,
                        attempts = attempt,
                        error = %error,
                        "giving up after {attempt} attempts"
                    );
                    return RetryOutcome::Exhausted {
                        error,
                        attempts: attempt,
                    };
                }
                Err(error) => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        op = label,
                        attempt,
                        max_attempts,
                        error = %error,
                        "attempt failed, retrying in {delay:?}"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
