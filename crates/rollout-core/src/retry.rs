//! Bounded retry with cancellable exponential backoff.
//!
//! The executor re-invokes an operation until it succeeds, fails with an error
//! the policy does not retry, runs out of attempts, or the cancellation token
//! fires. Waits between attempts race against the token, so a cancellation
//! never sleeps out the remaining backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ErrorKind;

/// Errors the executor knows how to classify and synthesize.
pub trait RetryableError: Sized {
    fn kind(&self) -> ErrorKind;

    /// Error returned when the executor aborts because of cancellation.
    fn cancelled() -> Self;
}

/// Attempt budget and backoff schedule for one kind of operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Name used in log output
    pub name: &'static str,
    /// Total number of invocations, including the first
    pub max_attempts: u32,
    /// Wait before the first retry
    pub initial_delay: Duration,
    /// Cap for exponential growth
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Policy for chart installation: 3 attempts, waits of 5s then 10s.
    pub const INSTALLATION: Self = Self {
        name: "installation",
        max_attempts: 3,
        initial_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(30),
        backoff_multiplier: 2.0,
    };

    pub fn new(
        name: &'static str,
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            name,
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    ///
    /// `initial_delay * backoff_multiplier^retry`, capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(retry as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped_secs).unwrap_or(self.max_delay)
    }

    /// All waits the policy can produce, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|retry| self.delay_for_retry(retry))
    }

    /// Only transient failures are retried.
    pub fn should_retry(&self, kind: ErrorKind) -> bool {
        kind == ErrorKind::Transient
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::INSTALLATION
    }
}

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

    /// Run `operation` under the policy.
    ///
    /// The operation receives the 1-based attempt number. Cancellation is
    /// checked before every attempt and during every backoff wait; an attempt
    /// already in flight is allowed to finish.
    pub async fn execute<T, E, F, Fut>(
        &self,
        token: &CancellationToken,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if token.is_cancelled() {
                debug!(policy = self.policy.name, attempt, "Cancelled before attempt");
                return Err(E::cancelled());
            }

            attempt += 1;
            debug!(policy = self.policy.name, attempt, max_attempts, "Starting attempt");

            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.policy.should_retry(err.kind()) {
                debug!(policy = self.policy.name, attempt, error = %err, "Not retrying");
                return Err(err);
            }

            if attempt >= max_attempts {
                warn!(
                    policy = self.policy.name,
                    attempts = attempt,
                    error = %err,
                    "Retries exhausted"
                );
                return Err(err);
            }

            let delay = self.policy.delay_for_retry(attempt - 1);
            warn!(
                policy = self.policy.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(policy = self.policy.name, attempt, "Cancelled during backoff");
                    return Err(E::cancelled());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installation_policy_values() {
        let policy = RetryPolicy::INSTALLATION;
        assert_eq!(policy.name, "installation");
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(5));
    }

    #[test]
    fn installation_delays_are_5_10() {
        let delays: Vec<_> = RetryPolicy::INSTALLATION.delays().collect();
        assert_eq!(delays, vec![Duration::from_secs(5), Duration::from_secs(10)]);
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::new(
            "capped",
            10,
            Duration::from_secs(1),
            Duration::from_secs(30),
            2.0,
        );
        assert_eq!(policy.delay_for_retry(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for_retry(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for_retry(9), Duration::from_secs(30));
    }

    #[test]
    fn oversized_delays_fall_back_to_cap() {
        let huge = Duration::from_secs(u64::MAX);
        let policy = RetryPolicy::new("huge", 3, huge, huge, 2.0);
        assert_eq!(policy.delay_for_retry(0), huge);
        assert_eq!(policy.delay_for_retry(1), huge);
    }

    #[test]
    fn single_attempt_policy_has_no_delays() {
        let policy = RetryPolicy::new(
            "once",
            1,
            Duration::from_secs(1),
            Duration::from_secs(1),
            1.0,
        );
        assert_eq!(policy.delays().count(), 0);
    }

    #[test]
    fn only_transient_is_retried() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(ErrorKind::Transient));
        assert!(!policy.should_retry(ErrorKind::Permanent));
        assert!(!policy.should_retry(ErrorKind::Cancelled));
    }
}
