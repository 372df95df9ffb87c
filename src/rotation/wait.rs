//! Waiting for eventual consistency in the remote services.
//!
//! Fixed settling delays are expressed as bounded polls: probe the remote state, back
//! off exponentially, give up after `max_attempts`. All suspension goes through a
//! [`Sleeper`] so tests can observe the delays without waiting for them.

use crate::errors::Result;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for bounded exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Backoff before the second attempt
    pub initial_backoff: Duration,
    /// Cap for exponential growth
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff to wait before the given attempt (0-indexed). The first attempt never waits.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let multiplier = self.backoff_multiplier.powi(attempt as i32 - 1);
        let backoff_ms = self.initial_backoff.as_millis() as f64 * multiplier;
        let capped_ms = backoff_ms.min(self.max_backoff.as_millis() as f64);

        Duration::from_millis(capped_ms as u64)
    }
}

/// Suspends the current task.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Result of a bounded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { attempts: u32 },
}

/// Runs probes and retries against a [`RetryConfig`].
pub struct Poller<'a> {
    retry: &'a RetryConfig,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Poller<'a> {
    pub fn new(retry: &'a RetryConfig, sleeper: &'a dyn Sleeper) -> Self {
        Self { retry, sleeper }
    }

    /// Probe until it yields `Some`, backing off between attempts.
    ///
    /// A probe error ends the poll immediately.
    pub async fn until_ready<T, F, Fut>(&self, what: &str, mut probe: F) -> Result<PollOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        for attempt in 0..self.retry.max_attempts {
            let backoff = self.retry.backoff_for_attempt(attempt);
            if !backoff.is_zero() {
                debug!(
                    what = %what,
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    "Waiting before next readiness probe"
                );
                self.sleeper.sleep(backoff).await;
            }

            if let Some(value) = probe().await? {
                return Ok(PollOutcome::Ready(value));
            }
        }

        Ok(PollOutcome::TimedOut { attempts: self.retry.max_attempts })
    }

    /// Run `operation`, retrying retryable errors with backoff.
    pub async fn retry<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    attempt += 1;
                    let backoff = self.retry.backoff_for_attempt(attempt);
                    warn!(
                        what = %what,
                        error = %e,
                        attempt = attempt + 1,
                        max_attempts = self.retry.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "Retrying after backoff"
                    );
                    self.sleeper.sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RotatorError;
    use crate::memory::RecordingSleeper;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let config = fast_retry(10);
        assert_eq!(config.backoff_for_attempt(0), Duration::ZERO);
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_millis(400));
        assert_eq!(config.backoff_for_attempt(7), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_until_ready_returns_first_value() {
        let sleeper = RecordingSleeper::default();
        let retry = fast_retry(5);
        let calls = AtomicU32::new(0);

        let outcome = Poller::new(&retry, &sleeper)
            .until_ready("probe", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok(if n >= 2 { Some(n) } else { None })
            })
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Ready(2));
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn test_until_ready_times_out() {
        let sleeper = RecordingSleeper::default();
        let retry = fast_retry(3);

        let outcome: PollOutcome<()> = Poller::new(&retry, &sleeper)
            .until_ready("probe", || async { Ok(None) })
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 3 });
        assert_eq!(sleeper.recorded().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_error() {
        let sleeper = RecordingSleeper::default();
        let retry = fast_retry(5);
        let calls = AtomicU32::new(0);

        let result: Result<()> = Poller::new(&retry, &sleeper)
            .retry("delete", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RotatorError::not_found("certificate", "cert-old"))
            })
            .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let sleeper = RecordingSleeper::default();
        let retry = fast_retry(5);
        let calls = AtomicU32::new(0);

        let result = Poller::new(&retry, &sleeper)
            .retry("delete", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RotatorError::precondition("certificate", "cert-old", "still in use"))
                } else {
                    Ok("deleted")
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "deleted");
        assert_eq!(sleeper.recorded(), vec![Duration::from_millis(100)]);
    }
}
