//! # Retry Executor
//!
//! Re-invokes a failed async operation while its error kind is on the
//! configured allow-list and attempts remain. Any other error is returned
//! after the first attempt; exhaustion returns the last error unchanged.
//!
//! Delays grow exponentially with jitter, are capped at `max_delay`, and never
//! shrink from one retry to the next within a single `execute` call.

use crate::error::{Classify, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay schedule between attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor per retry
    pub multiplier: f64,
    /// Random extra fraction added to each delay (0.0 - 1.0)
    pub jitter_factor: f64,
}

impl BackoffConfig {
    /// Retry immediately; for tests and in-memory operations
    pub fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Delay for the given 1-based retry number, before monotonic clamping.
    ///
    /// Computed in float seconds and capped at `max_delay` before a
    /// `Duration` is built, so large multipliers or retry counts saturate
    /// instead of overflowing.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut seconds = self.base_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        if self.jitter_factor > 0.0 {
            seconds *= 1.0 + fastrand::f64() * self.jitter_factor.min(1.0);
        }

        if !seconds.is_finite() || seconds >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(seconds)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// A fresh schedule for one `execute` call
    pub fn schedule(&self) -> BackoffSchedule<'_> {
        BackoffSchedule {
            config: self,
            retry: 0,
            previous: Duration::ZERO,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Non-decreasing sequence of retry delays
#[derive(Debug)]
pub struct BackoffSchedule<'a> {
    config: &'a BackoffConfig,
    retry: u32,
    previous: Duration,
}

impl Iterator for BackoffSchedule<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.retry = self.retry.saturating_add(1);
        let delay = self.config.delay_for(self.retry).max(self.previous);
        self.previous = delay;
        Some(delay)
    }
}

/// Retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts are `max_retries + 1`
    pub max_retries: u32,
    /// Error kinds worth another attempt
    pub retryable: HashSet<ErrorKind>,
    pub backoff: BackoffConfig,
}

impl RetryConfig {
    pub fn new(max_retries: u32, retryable: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            max_retries,
            retryable: retryable.into_iter().collect(),
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Policy for the primary transactional write
    pub fn for_database() -> Self {
        Self::new(
            3,
            [ErrorKind::Timeout, ErrorKind::Connection, ErrorKind::Deadlock],
        )
    }

    /// Side-channel delivery tolerates more retries over a broader set of kinds
    pub fn for_event_publication() -> Self {
        Self::new(
            5,
            [
                ErrorKind::Timeout,
                ErrorKind::Connection,
                ErrorKind::Network,
                ErrorKind::Deadlock,
                ErrorKind::Unavailable,
                ErrorKind::RateLimited,
                ErrorKind::SubscriberFailed,
            ],
        )
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::for_database()
    }
}

/// Executes operations under a [`RetryConfig`]
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    name: String,
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(name: impl Into<String>, config: RetryConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Total attempts a persistently failing retryable operation receives
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }

    /// Run `operation`, retrying classified-transient failures
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let max_attempts = self.max_attempts();
        let mut delays = self.config.backoff.schedule();
        let mut attempt: u32 = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            executor = %self.name,
                            attempt,
                            "✅ Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let kind = error.kind();
                    if !self.config.is_retryable(kind) {
                        debug!(
                            executor = %self.name,
                            attempt,
                            error_kind = %kind,
                            error = %error,
                            "Non-retryable error, giving up"
                        );
                        return Err(error);
                    }

                    if attempt >= max_attempts {
                        warn!(
                            executor = %self.name,
                            attempts = attempt,
                            error_kind = %kind,
                            error = %error,
                            "🔁 Retries exhausted"
                        );
                        return Err(error);
                    }

                    let delay = delays.next().unwrap_or(self.config.backoff.max_delay);
                    debug!(
                        executor = %self.name,
                        attempt,
                        max_attempts,
                        error_kind = %kind,
                        delay_ms = delay.as_millis() as u64,
                        "🔁 Retrying after transient error"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResilienceError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor(max_retries: u32) -> RetryExecutor {
        RetryExecutor::new(
            "test",
            RetryConfig::new(
                max_retries,
                [ErrorKind::Timeout, ErrorKind::Connection, ErrorKind::Deadlock],
            )
            .with_backoff(BackoffConfig::none()),
        )
    }

    #[tokio::test]
    async fn test_retryable_error_gets_max_retries_plus_one_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = executor(3)
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::deadlock("bookings row locked"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            result.unwrap_err(),
            ResilienceError::deadlock("bookings row locked")
        );
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_attempted_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = executor(3)
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::validation("booking already approved"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = executor(3)
            .execute(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ResilienceError::connection("pool exhausted"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let calls = AtomicU32::new(0);
        let _: Result<(), _> = executor(0)
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::timeout("slow"))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let executor = RetryExecutor::new(
            "paused",
            RetryConfig::new(2, [ErrorKind::Timeout]).with_backoff(BackoffConfig {
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
                multiplier: 2.0,
                jitter_factor: 0.0,
            }),
        );

        let start = tokio::time::Instant::now();
        let _: Result<(), _> = executor
            .execute(|| async { Err(ResilienceError::timeout("slow")) })
            .await;

        // 100ms then 200ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(350));
    }

    #[test]
    fn test_schedule_is_capped_and_non_decreasing() {
        let backoff = BackoffConfig {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
            multiplier: 3.0,
            jitter_factor: 0.5,
        };
        let delays: Vec<Duration> = backoff.schedule().take(8).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(500)));
        assert_eq!(delays[7], Duration::from_millis(500));
    }

    #[test]
    fn test_huge_growth_saturates_at_max_delay() {
        let backoff = BackoffConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 10.0,
            jitter_factor: 0.1,
        };
        assert_eq!(backoff.delay_for(30), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(1));

        let unbounded = BackoffConfig {
            multiplier: f64::INFINITY,
            ..backoff.clone()
        };
        assert_eq!(unbounded.delay_for(2), Duration::from_secs(1));
        assert!(unbounded.delay_for(1) < Duration::from_secs(1));

        let no_cap = BackoffConfig {
            max_delay: Duration::MAX,
            ..backoff
        };
        assert_eq!(no_cap.delay_for(1_000), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_retries_with_large_multiplier_complete() {
        let executor = RetryExecutor::new(
            "events",
            RetryConfig::new(30, [ErrorKind::Timeout]).with_backoff(BackoffConfig {
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_millis(1000),
                multiplier: 10.0,
                jitter_factor: 0.1,
            }),
        );
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::timeout("broker unreachable"))
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 31);
    }

    #[test]
    fn test_presets() {
        let db = RetryConfig::for_database();
        assert_eq!(db.max_retries, 3);
        assert!(db.is_retryable(ErrorKind::Deadlock));
        assert!(!db.is_retryable(ErrorKind::SubscriberFailed));

        let events = RetryConfig::for_event_publication();
        assert_eq!(events.max_retries, 5);
        assert!(events.is_retryable(ErrorKind::SubscriberFailed));
        assert!(!events.is_retryable(ErrorKind::Validation));
    }
}
