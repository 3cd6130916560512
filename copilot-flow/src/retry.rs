//! Bounded retry with a fixed backoff, shared by every network-calling client
//! and by the turn runner.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

/// Value produced by a retried operation together with the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

impl RetryPolicy {
    /// `max_attempts` of zero is treated as a single attempt.
    pub const fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            backoff,
        }
    }

    pub const fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Hosted scoring endpoints that scale to zero answer 503 while warming up.
    pub const fn cold_start() -> Self {
        Self::fixed(12, Duration::from_secs(5))
    }

    pub const fn turn() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run `op` until it succeeds or the attempts are exhausted.
    ///
    /// The closure receives the 1-based attempt number. On exhaustion the
    /// last error is returned.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Attempted<Result<T, E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return Attempted {
                        value: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        operation = %label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        operation = %label,
                        attempts = attempt,
                        error = %e,
                        "Giving up after final attempt"
                    );
                    return Attempted {
                        value: Err(e),
                        attempts: attempt,
                    };
                }
            }
        }
    }

    /// Run `op` while `should_retry` judges its output retryable.
    ///
    /// After the last attempt the final output is returned as-is, even if it
    /// would still be considered retryable.
    pub async fn run_while<T, F, Fut, P>(&self, label: &str, mut op: F, should_retry: P) -> Attempted<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = T>,
        P: Fn(&T) -> bool,
    {
        let mut attempt = 1;
        loop {
            let value = op(attempt).await;
            if !should_retry(&value) || attempt >= self.max_attempts {
                return Attempted {
                    value,
                    attempts: attempt,
                };
            }
            debug!(
                operation = %label,
                attempt,
                max_attempts = self.max_attempts,
                backoff_ms = self.backoff.as_millis() as u64,
                "Retryable response, waiting before next attempt"
            );
            tokio::time::sleep(self.backoff).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::turn()
    }
}
