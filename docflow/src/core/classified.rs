//! Classified errors recorded on a processing context.

use crate::errors::{RemoteErrorKind, RetryError};
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy for everything a document run can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input; never retried, never compensated.
    Validation,
    /// A remote call used up its retry budget.
    RetryExhausted,
    /// A remote call failed with a non-retryable error.
    NonRetryableRemote,
    /// Another run committed the same fingerprint first.
    DurableConflict,
    /// The durable write failed for a reason other than a conflict.
    CommitFailed,
    /// A cleanup action failed; needs operator follow-up.
    CompensationFailure,
    /// The run was cancelled.
    Cancelled,
    /// A stage registered resources without declaring it.
    UndeclaredSideEffect,
    /// An internal invariant failed.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::RetryExhausted => "retry_exhausted",
            Self::NonRetryableRemote => "non_retryable_remote",
            Self::DurableConflict => "durable_conflict",
            Self::CommitFailed => "commit_failed",
            Self::CompensationFailure => "compensation_failure",
            Self::Cancelled => "cancelled",
            Self::UndeclaredSideEffect => "undeclared_side_effect",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// An error tagged with its kind and the stage that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// The error kind.
    pub kind: ErrorKind,
    /// The stage that raised it.
    pub stage: String,
    /// Human readable message.
    pub message: String,
    /// Remote attempts consumed, for retry-related errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    /// When the error was recorded.
    pub occurred_at: Timestamp,
}

impl ClassifiedError {
    /// Creates a new classified error.
    #[must_use]
    pub fn new(kind: ErrorKind, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage: stage.into(),
            message: message.into(),
            attempts: None,
            occurred_at: now_utc(),
        }
    }

    /// Sets the attempt count.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Classifies a terminal retry error raised by `stage`.
    ///
    /// Exhaustion is always fatal. A non-retryable failure whose remote kind
    /// is `Validation` is reported as a validation error, anything else as a
    /// non-retryable remote failure.
    #[must_use]
    pub fn from_retry(stage: impl Into<String>, err: &RetryError) -> Self {
        let kind = match err {
            RetryError::Exhausted { .. } => ErrorKind::RetryExhausted,
            RetryError::NonRetryable { error, .. } if error.kind == RemoteErrorKind::Validation => {
                ErrorKind::Validation
            }
            RetryError::NonRetryable { .. } => ErrorKind::NonRetryableRemote,
        };
        Self::new(kind, stage, err.to_string()).with_attempts(err.attempts())
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.stage, self.message)
    }
}
