//! Lifecycle events emitted while documents move through the pipeline.
//!
//! Every event carries the run id, the stage it concerns (if any) and a JSON
//! payload built by [`crate::observability`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kinds of event the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Before the first stage runs.
    #[serde(rename = "document.started")]
    DocumentStarted,
    /// Once the run reaches a terminal status.
    #[serde(rename = "document.finished")]
    DocumentFinished,
    /// When a run observes cancellation between stages.
    #[serde(rename = "document.cancelled")]
    DocumentCancelled,
    /// Before a stage executes.
    #[serde(rename = "stage.started")]
    StageStarted,
    /// A stage returned `Continue`.
    #[serde(rename = "stage.completed")]
    StageCompleted,
    /// A stage returned `Skip`.
    #[serde(rename = "stage.skipped")]
    StageSkipped,
    /// A stage returned `Invalid` or `Fatal`.
    #[serde(rename = "stage.failed")]
    StageFailed,
    /// A unit of work was unwound.
    #[serde(rename = "compensation.ran")]
    CompensationRan,
}

impl PipelineEvent {
    /// Returns the dotted event name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentStarted => "document.started",
            Self::DocumentFinished => "document.finished",
            Self::DocumentCancelled => "document.cancelled",
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageSkipped => "stage.skipped",
            Self::StageFailed => "stage.failed",
            Self::CompensationRan => "compensation.ran",
        }
    }

    /// Returns true for events about a single stage.
    #[must_use]
    pub fn is_stage_event(&self) -> bool {
        matches!(
            self,
            Self::StageStarted | Self::StageCompleted | Self::StageSkipped | Self::StageFailed
        )
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// What happened.
    pub kind: PipelineEvent,
    /// The run it happened in.
    pub run_id: Uuid,
    /// The stage involved, for stage, cancellation and compensation events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Structured details.
    pub payload: serde_json::Value,
}

impl Event {
    /// Creates a document-level event.
    #[must_use]
    pub fn document(kind: PipelineEvent, run_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            kind,
            run_id,
            stage: None,
            payload,
        }
    }

    /// Creates an event about `stage`.
    #[must_use]
    pub fn stage(
        kind: PipelineEvent,
        run_id: Uuid,
        stage: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            run_id,
            stage: Some(stage.into()),
            payload,
        }
    }
}
