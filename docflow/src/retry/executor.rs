//! Executes remote calls under a retry policy.

use super::policy::RetryPolicy;
use crate::errors::{RemoteError, RetryError, Retryability};
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Suspends the caller between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync + Debug {
    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Runs a single remote call with bounded exponential backoff.
///
/// The executor keeps no state between calls; the policy is passed in at
/// every call site.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    sleeper: Arc<dyn Sleeper>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutor {
    /// Creates an executor that sleeps on the tokio timer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Creates an executor with a custom sleeper.
    #[must_use]
    pub fn with_sleeper(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    /// Invokes `operation` until it succeeds, fails non-retryably, or the
    /// attempt budget runs out.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::NonRetryable`] on the first non-retryable
    /// failure and [`RetryError::Exhausted`] after `max_attempts` retryable
    /// failures.
    pub async fn execute<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, RemoteError>> + Send,
        T: Send,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            let result = match policy.call_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(inner) => inner,
                    Err(_) => Err(RemoteError::timeout(format!(
                        "{operation_name} did not complete within {}ms",
                        limit.as_millis()
                    ))),
                },
                None => operation().await,
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if policy.classify(&err) == Retryability::NonRetryable {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "Non-retryable failure"
                );
                return Err(RetryError::NonRetryable {
                    operation: operation_name.to_string(),
                    attempt,
                    error: err,
                });
            }

            if attempt >= max_attempts {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %err,
                    "Retries exhausted"
                );
                return Err(RetryError::Exhausted {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                    last_error: err,
                });
            }

            attempt += 1;
            let wait = policy.effective_wait(attempt, err.retry_after);
            debug!(
                operation = operation_name,
                next_attempt = attempt,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Retrying after transient failure"
            );
            self.sleeper.sleep(wait).await;
        }
    }
}
