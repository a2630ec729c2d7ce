//! Document status, stage status and stage kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// A stage that rejects malformed input before any remote call.
    Guard,
    /// A stage that derives local facts about the document (e.g. fingerprint).
    Enrich,
    /// A stage that calls a remote service without creating resources.
    Transform,
    /// A stage that performs side effects (upload, index, persist).
    #[default]
    Work,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guard => write!(f, "guard"),
            Self::Enrich => write!(f, "enrich"),
            Self::Transform => write!(f, "transform"),
            Self::Work => write!(f, "work"),
        }
    }
}

/// Terminal outcome of one stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage completed and the pipeline continues.
    Ok,
    /// The stage short-circuited the pipeline.
    Skip,
    /// The stage rejected the input.
    Invalid,
    /// The stage failed.
    Fatal,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Skip => write!(f, "skip"),
            Self::Invalid => write!(f, "invalid"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Lifecycle status of a document run.
///
/// Transitions only move forward: `Pending` to one of the three terminal
/// states, never out of a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// The run is in progress.
    #[default]
    Pending,
    /// The document was already processed.
    Duplicate,
    /// The document was processed and committed.
    Completed,
    /// The run failed.
    Failed,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl DocumentStatus {
    /// Returns true if no further transition is allowed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns true if moving to `next` is a forward transition.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(self, Self::Pending) && next.is_terminal()
    }
}
