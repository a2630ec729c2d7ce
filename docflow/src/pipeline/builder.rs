//! Pipeline builder with validation.

use super::Pipeline;
use crate::compensation::{AuditSink, InMemoryAuditLog, DEFAULT_ACTION_TIMEOUT};
use crate::errors::PipelineValidationError;
use crate::events::{EventSink, NoOpEventSink};
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating validated pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// Stages in execution order.
    stages: Vec<Arc<dyn Stage>>,
    /// Names already taken.
    names: HashSet<String>,
    events: Option<Arc<dyn EventSink>>,
    audit: Option<Arc<dyn AuditSink>>,
    cleanup_timeout: Duration,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            names: HashSet::new(),
            events: None,
            audit: None,
            cleanup_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    /// Appends a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or already used.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Result<Self, PipelineValidationError> {
        let name = stage.name().to_string();
        if name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty"));
        }
        if !self.names.insert(name.clone()) {
            return Err(
                PipelineValidationError::new(format!("Duplicate stage name '{name}'"))
                    .with_stage(name),
            );
        }
        self.stages.push(stage);
        Ok(self)
    }

    /// Sets the sink receiving lifecycle events. Defaults to discarding them.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Sets the audit sink. Defaults to an in-memory log.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Sets the time limit for each cleanup action.
    #[must_use]
    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no stages, or if a stage that creates
    /// remote resources is not followed by a committing stage.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages"));
        }

        let last_commit = self.stages.iter().rposition(|s| s.commits());
        for (index, stage) in self.stages.iter().enumerate() {
            if !stage.creates_resources() {
                continue;
            }
            let committed_later = last_commit.is_some_and(|commit| commit > index);
            if !committed_later {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' creates remote resources but no committing stage follows it",
                    stage.name()
                ))
                .with_stage(stage.name()));
            }
        }

        Ok(Pipeline {
            name: self.name,
            stages: self.stages,
            events: self.events.unwrap_or_else(|| Arc::new(NoOpEventSink)),
            audit: self
                .audit
                .unwrap_or_else(|| Arc::new(InMemoryAuditLog::new())),
            cleanup_timeout: self.cleanup_timeout,
        })
    }
}
