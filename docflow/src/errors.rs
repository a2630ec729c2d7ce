//! Error types for the docflow pipeline.
//!
//! Errors are split by concern: remote collaborator failures carry an
//! explicit [`RemoteErrorKind`] tag that the retry executor classifies,
//! storage errors distinguish uniqueness conflicts from backend faults, and
//! [`DocflowError`] aggregates everything for top-level APIs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The main error type for docflow operations.
#[derive(Debug, Error)]
pub enum DocflowError {
    /// A pipeline definition was rejected.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A remote collaborator failed.
    #[error("{0}")]
    Remote(#[from] RemoteError),

    /// A retried remote call gave up.
    #[error("{0}")]
    Retry(#[from] RetryError),

    /// The durable store failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A processing context invariant was violated.
    #[error("{0}")]
    Context(#[from] ContextError),

    /// Writing to the audit log failed.
    #[error("{0}")]
    Audit(#[from] AuditError),

    /// Configuration was invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tag describing what went wrong in a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The request was rejected as malformed (4xx-equivalent).
    Validation,
    /// The referenced resource does not exist.
    NotFound,
    /// The request conflicts with existing remote state.
    Conflict,
    /// The service asked the caller to slow down.
    RateLimited,
    /// The call did not complete in time.
    Timeout,
    /// The service could not be reached.
    Connectivity,
    /// The service failed internally (5xx-equivalent).
    Server,
    /// Anything the collaborator could not classify.
    Unknown,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Timeout => write!(f, "timeout"),
            Self::Connectivity => write!(f, "connectivity"),
            Self::Server => write!(f, "server"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Whether a failure may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retryability {
    /// Transient; safe to try again.
    Retryable,
    /// Terminal; fail fast.
    NonRetryable,
}

/// A classified failure returned by a remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// The failure class.
    pub kind: RemoteErrorKind,
    /// HTTP-like status code, when the transport has one.
    pub status: Option<u16>,
    /// Human readable message.
    pub message: String,
    /// Server supplied hint for when to retry.
    pub retry_after: Option<Duration>,
}

impl RemoteError {
    /// Creates a new remote error.
    #[must_use]
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Maps an HTTP-like status code onto a remote error.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            404 | 410 => RemoteErrorKind::NotFound,
            408 => RemoteErrorKind::Timeout,
            409 => RemoteErrorKind::Conflict,
            429 => RemoteErrorKind::RateLimited,
            400..=499 => RemoteErrorKind::Validation,
            500..=599 => RemoteErrorKind::Server,
            _ => RemoteErrorKind::Unknown,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
            retry_after: None,
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Validation, message)
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Timeout, message)
    }

    /// Creates a connectivity error.
    #[must_use]
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Connectivity, message)
    }

    /// Creates a server error.
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Server, message)
    }

    /// Creates a rate-limit error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::RateLimited, message)
    }

    /// Attaches a retry-after hint.
    #[must_use]
    pub fn with_retry_after(mut self, after: Duration) -> Self {
        self.retry_after = Some(after);
        self
    }

    /// Attaches a status code without changing the kind.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Default classification used by retry policies.
    ///
    /// Timeouts, connectivity failures, rate limiting and server faults are
    /// transient. Everything else, including unknown failures, fails fast.
    #[must_use]
    pub fn default_classification(&self) -> Retryability {
        match self.kind {
            RemoteErrorKind::Timeout
            | RemoteErrorKind::Connectivity
            | RemoteErrorKind::RateLimited
            | RemoteErrorKind::Server => Retryability::Retryable,
            RemoteErrorKind::Validation
            | RemoteErrorKind::NotFound
            | RemoteErrorKind::Conflict
            | RemoteErrorKind::Unknown => Retryability::NonRetryable,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "remote {} error ({status}): {}", self.kind, self.message),
            None => write!(f, "remote {} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Terminal outcome of a retried remote call.
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    /// Every attempt failed with a retryable error.
    #[error("{operation}: retries exhausted after {attempts} attempts: {last_error}")]
    Exhausted {
        /// The operation name.
        operation: String,
        /// Attempts made.
        attempts: u32,
        /// The error from the final attempt.
        last_error: RemoteError,
    },

    /// An attempt failed with a non-retryable error.
    #[error("{operation}: non-retryable failure on attempt {attempt}: {error}")]
    NonRetryable {
        /// The operation name.
        operation: String,
        /// The attempt that failed.
        attempt: u32,
        /// The error.
        error: RemoteError,
    },
}

impl RetryError {
    /// Returns the number of attempts consumed.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::NonRetryable { attempt, .. } => *attempt,
        }
    }

    /// Returns the underlying remote error.
    #[must_use]
    pub fn remote_error(&self) -> &RemoteError {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::NonRetryable { error, .. } => error,
        }
    }

    /// Returns true if the budget was exhausted.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Errors raised by the durable document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with this fingerprint already exists.
    #[error("a record with fingerprint {fingerprint} already exists")]
    Conflict {
        /// The conflicting fingerprint.
        fingerprint: String,
    },

    /// No record exists for the fingerprint.
    #[error("no record with fingerprint {fingerprint}")]
    NotFound {
        /// The missing fingerprint.
        fingerprint: String,
    },

    /// The backend failed.
    #[error("store backend error: {0}")]
    Backend(String),

    /// Record (de)serialization failed.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true for uniqueness conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Violations of processing context invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// A set-once field was written twice.
    #[error("field '{0}' is already set")]
    AlreadySet(&'static str),

    /// The context is finalized and no longer accepts writes.
    #[error("context is finalized with status {0}")]
    Finalized(String),

    /// The context has already reached a terminal status.
    #[error("cannot move from terminal status {from} to {to}")]
    TerminalStatus {
        /// The current status.
        from: String,
        /// The requested status.
        to: String,
    },
}

/// Errors writing audit entries.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The entry could not be serialized.
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The entry could not be written.
    #[error("audit IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration for '{field}': {message}")]
pub struct ConfigError {
    /// The offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A pipeline definition was rejected at build time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pipeline: {message}")]
pub struct PipelineValidationError {
    /// What is wrong.
    pub message: String,
    /// The stage involved, if any.
    pub stage: Option<String>,
}

impl PipelineValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: None,
        }
    }

    /// Sets the stage involved.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}
