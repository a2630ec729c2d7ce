//! Stage output signalled back to the pipeline engine.

use super::{ClassifiedError, ErrorKind, StageStatus};
use crate::errors::RetryError;

/// What a stage tells the engine after it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    /// Proceed to the next stage.
    Continue,
    /// Short-circuit: skip the remaining stages and finish as a duplicate.
    Skip {
        /// Why the pipeline was short-circuited.
        reason: String,
    },
    /// The input is malformed. Stop without retrying.
    Invalid(ClassifiedError),
    /// The stage failed. Stop and unwind any created resources.
    Fatal(ClassifiedError),
}

impl StageOutput {
    /// Creates a continue output.
    #[must_use]
    pub fn ok() -> Self {
        Self::Continue
    }

    /// Creates a skip output with a reason.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip {
            reason: reason.into(),
        }
    }

    /// Creates a validation failure raised by `stage`.
    #[must_use]
    pub fn invalid(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid(ClassifiedError::new(ErrorKind::Validation, stage, message))
    }

    /// Creates a fatal failure.
    #[must_use]
    pub fn fatal(error: ClassifiedError) -> Self {
        Self::Fatal(error)
    }

    /// Maps a terminal retry error onto a stage output.
    ///
    /// A remote validation rejection becomes `Invalid`; everything else is
    /// `Fatal`.
    #[must_use]
    pub fn from_retry(stage: impl Into<String>, err: &RetryError) -> Self {
        let classified = ClassifiedError::from_retry(stage, err);
        if classified.kind == ErrorKind::Validation {
            Self::Invalid(classified)
        } else {
            Self::Fatal(classified)
        }
    }

    /// Returns the status for timing records and events.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        match self {
            Self::Continue => StageStatus::Ok,
            Self::Skip { .. } => StageStatus::Skip,
            Self::Invalid(_) => StageStatus::Invalid,
            Self::Fatal(_) => StageStatus::Fatal,
        }
    }

    /// Returns true if the pipeline should continue.
    #[must_use]
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Returns the error carried by a failure output.
    #[must_use]
    pub fn error(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Invalid(err) | Self::Fatal(err) => Some(err),
            Self::Continue | Self::Skip { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RemoteError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(StageOutput::ok().status(), StageStatus::Ok);
        assert_eq!(StageOutput::skip("dup").status(), StageStatus::Skip);
        assert_eq!(StageOutput::invalid("validate", "empty").status(), StageStatus::Invalid);
        assert!(StageOutput::ok().is_continue());
        assert!(StageOutput::ok().error().is_none());
    }

    #[test]
    fn test_from_retry_validation_is_invalid() {
        let err = RetryError::NonRetryable {
            operation: "extract".to_string(),
            attempt: 1,
            error: RemoteError::from_status(422, "not a pdf"),
        };
        let output = StageOutput::from_retry("extract", &err);
        assert_eq!(output.status(), StageStatus::Invalid);
    }

    #[test]
    fn test_from_retry_exhausted_is_fatal() {
        let err = RetryError::Exhausted {
            operation: "upload".to_string(),
            attempts: 4,
            last_error: RemoteError::server("502"),
        };
        let output = StageOutput::from_retry("upload", &err);
        assert_eq!(output.status(), StageStatus::Fatal);
        assert_eq!(output.error().map(|e| e.kind), Some(ErrorKind::RetryExhausted));
    }
}
