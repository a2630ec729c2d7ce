//! Immutable retry policies.

use crate::errors::{RemoteError, Retryability};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Classifier deciding whether a remote failure may be retried.
pub type Classifier = fn(&RemoteError) -> Retryability;

/// Jitter applied on top of the exponential schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Deterministic waits.
    #[default]
    None,
    /// Random from 0 to the computed wait.
    Full,
    /// Half fixed, half random.
    Equal,
}

impl JitterStrategy {
    /// Applies the jitter to a computed wait.
    #[must_use]
    pub fn apply(self, wait: Duration) -> Duration {
        let millis = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        let jittered = match self {
            Self::None => millis,
            Self::Full => {
                if millis == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=millis)
                }
            }
            Self::Equal => {
                let half = millis / 2;
                if half == 0 {
                    millis
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };
        Duration::from_millis(jittered)
    }
}

/// Bounded exponential backoff for a single remote call.
///
/// The policy holds no mutable state, so one value can be shared by every
/// concurrent call site.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub initial_wait: Duration,
    /// Upper bound on any single wait.
    pub max_wait: Duration,
    /// Bound on each individual attempt.
    pub call_timeout: Option<Duration>,
    /// Jitter applied to each wait.
    pub jitter: JitterStrategy,
    /// Failure classifier.
    pub classify: Classifier,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_wait", &self.initial_wait)
            .field("max_wait", &self.max_wait)
            .field("call_timeout", &self.call_timeout)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_wait: Duration::from_secs(2),
            max_wait: Duration::from_secs(30),
            call_timeout: Some(Duration::from_secs(30)),
            jitter: JitterStrategy::None,
            classify: RemoteError::default_classification,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets the maximum attempts. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the initial wait.
    #[must_use]
    pub fn with_initial_wait(mut self, wait: Duration) -> Self {
        self.initial_wait = wait;
        self
    }

    /// Sets the maximum wait.
    #[must_use]
    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the failure classifier.
    #[must_use]
    pub fn with_classifier(mut self, classify: Classifier) -> Self {
        self.classify = classify;
        self
    }

    /// Classifies a failure.
    #[must_use]
    pub fn classify(&self, err: &RemoteError) -> Retryability {
        (self.classify)(err)
    }

    /// Returns the un-jittered wait before `attempt` (1-based).
    ///
    /// Attempt 1 is immediate. Attempt n waits
    /// `min(max_wait, initial_wait * 2^(n-2))`.
    #[must_use]
    pub fn wait_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = attempt - 2;
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial_wait
            .checked_mul(factor)
            .unwrap_or(self.max_wait)
            .min(self.max_wait)
    }

    /// Returns the wait before every attempt, starting with attempt 1.
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts).map(|n| self.wait_before(n)).collect()
    }

    /// Computes the actual wait before `attempt`, honouring a server hint.
    ///
    /// The hint can only raise the wait and is still capped at `max_wait`.
    #[must_use]
    pub fn effective_wait(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let base = self.jitter.apply(self.wait_before(attempt));
        match hint {
            Some(after) => base.max(after).min(self.max_wait),
            None => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RemoteErrorKind;
    use pretty_assertions::assert_eq;

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_wait, Duration::from_secs(2));
        assert_eq!(policy.call_timeout, Some(Duration::from_secs(30)));
        assert_eq!(policy.jitter, JitterStrategy::None);
    }

    #[test]
    fn test_schedule_doubles_from_initial_wait() {
        let policy = RetryPolicy::new()
            .with_max_attempts(5)
            .with_initial_wait(Duration::from_secs(2))
            .with_max_wait(Duration::from_secs(60));
        assert_eq!(policy.schedule(), secs(&[0, 2, 4, 8, 16]));
    }

    #[test]
    fn test_schedule_capped_at_max_wait() {
        let policy = RetryPolicy::new()
            .with_max_attempts(6)
            .with_initial_wait(Duration::from_secs(2))
            .with_max_wait(Duration::from_secs(10));
        assert_eq!(policy.schedule(), secs(&[0, 2, 4, 8, 10, 10]));
    }

    #[test]
    fn test_wait_before_large_attempt_saturates() {
        let policy = RetryPolicy::new().with_max_wait(Duration::from_secs(30));
        assert_eq!(policy.wait_before(64), Duration::from_secs(30));
    }

    #[test]
    fn test_max_attempts_at_least_one() {
        let policy = RetryPolicy::new().with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(RetryPolicy::no_retry().schedule(), secs(&[0]));
    }

    #[test]
    fn test_retry_after_hint_raises_and_caps() {
        let policy = RetryPolicy::new()
            .with_initial_wait(Duration::from_secs(1))
            .with_max_wait(Duration::from_secs(10));

        assert_eq!(
            policy.effective_wait(2, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            policy.effective_wait(2, Some(Duration::from_secs(120))),
            Duration::from_secs(10)
        );
        assert_eq!(
            policy.effective_wait(3, Some(Duration::from_millis(10))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_full_jitter_bounded() {
        let wait = Duration::from_millis(100);
        for _ in 0..20 {
            assert!(JitterStrategy::Full.apply(wait) <= wait);
            let equal = JitterStrategy::Equal.apply(wait);
            assert!(equal >= Duration::from_millis(50) && equal <= wait);
        }
    }

    #[test]
    fn test_custom_classifier() {
        fn everything_retryable(_: &RemoteError) -> Retryability {
            Retryability::Retryable
        }
        let policy = RetryPolicy::new().with_classifier(everything_retryable);
        let err = RemoteError::new(RemoteErrorKind::Validation, "bad");
        assert_eq!(policy.classify(&err), Retryability::Retryable);
    }
}
