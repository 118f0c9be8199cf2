//! Exponential-backoff retry for workflow activities.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::{Result, WorkflowError};

/// Backoff schedule applied to retryable activity failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval_s: u64,
    pub max_interval_s: u64,
    pub backoff_coefficient: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_s: 10,
            max_interval_s: 30,
            backoff_coefficient: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given (1-based) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let secs = self.initial_interval_s as f64 * self.backoff_coefficient.powi(exponent as i32);
        Duration::from_secs_f64(secs.min(self.max_interval_s as f64))
    }

    /// Run `activity` until success, a non-retryable error, exhaustion of the
    /// attempt budget, or cancellation. Backoff sleeps are interruptible.
    pub async fn run<T, F, Fut>(
        &self,
        activity: &str,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1u32;
        loop {
            if cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }

            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    warn!(activity, attempt, error = %e, "non-retryable failure");
                    return Err(e);
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!(activity, attempt, error = %e, "retry budget exhausted");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(activity, attempt, error = %e, delay_s = delay.as_secs_f64(), "retrying after backoff");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
                        _ = sleep(delay) => {}
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
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(20));
        // 10 * 2^2 = 40, capped at 30.
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let result = policy
            .run("flaky", &cancel, || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(WorkflowError::Parse("transient".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let err = policy
            .run("hopeless", &cancel, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(WorkflowError::Parse("always".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Parse(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_fails_immediately() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let err = policy
            .run("forbidden", &cancel, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(WorkflowError::Clone(
                        repo_clone_service::CloneError::NonRetryable("403".into()),
                    ))
                }
            })
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_backoff_sleep() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = policy
            .run("cancelled", &cancel, || async { Ok::<_, WorkflowError>(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Cancelled));
    }
}
