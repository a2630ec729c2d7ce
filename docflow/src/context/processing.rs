//! The processing context owned by a single document run.

use super::{RemoteResource, ResourceKind};
use crate::core::{ClassifiedError, DocumentStatus, Fingerprint, StageKind, StageStatus};
use crate::errors::ContextError;
use crate::remote::Extraction;
use crate::utils::{generate_run_id, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Timing and outcome of one stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub stage: String,
    /// Stage kind.
    pub kind: StageKind,
    /// Outcome.
    pub status: StageStatus,
    /// When the stage started.
    pub started_at: Timestamp,
    /// When the stage ended.
    pub ended_at: Timestamp,
}

impl StageRecord {
    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// State of one document as it moves through the pipeline.
///
/// A context is created by the engine for each run and never shared with
/// another run. Set-once fields reject a second write, resource ids can only
/// be appended through
/// [`CompensatingTransaction::register`](crate::compensation::CompensatingTransaction::register),
/// and the status only moves forward.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    run_id: Uuid,
    raw_bytes: Arc<[u8]>,
    fingerprint: Option<Fingerprint>,
    is_duplicate: bool,
    remote_resource_ids: Vec<RemoteResource>,
    extraction: Option<Extraction>,
    status: DocumentStatus,
    errors: Vec<ClassifiedError>,
    stage_records: Vec<StageRecord>,
    created_at: Timestamp,
    finished_at: Option<Timestamp>,
}

impl ProcessingContext {
    /// Creates a pending context for `raw_bytes`.
    #[must_use]
    pub fn new(raw_bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            run_id: generate_run_id(),
            raw_bytes: raw_bytes.into(),
            fingerprint: None,
            is_duplicate: false,
            remote_resource_ids: Vec::new(),
            extraction: None,
            status: DocumentStatus::Pending,
            errors: Vec::new(),
            stage_records: Vec::new(),
            created_at: now_utc(),
            finished_at: None,
        }
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the raw document bytes.
    #[must_use]
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    /// Returns a shared handle to the raw bytes.
    #[must_use]
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.raw_bytes)
    }

    /// Returns the fingerprint once the dedup stage has set it.
    #[must_use]
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    /// Sets the fingerprint. Fails if it was already set.
    pub fn set_fingerprint(&mut self, fingerprint: Fingerprint) -> Result<(), ContextError> {
        self.ensure_open()?;
        if self.fingerprint.is_some() {
            return Err(ContextError::AlreadySet("fingerprint"));
        }
        self.fingerprint = Some(fingerprint);
        Ok(())
    }

    /// Returns true if the document was found to be a duplicate.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.is_duplicate
    }

    /// Flags the document as a duplicate. Fails if already flagged.
    pub fn mark_duplicate(&mut self) -> Result<(), ContextError> {
        self.ensure_open()?;
        if self.is_duplicate {
            return Err(ContextError::AlreadySet("is_duplicate"));
        }
        self.is_duplicate = true;
        Ok(())
    }

    /// Returns every remote resource created during the run, in creation order.
    #[must_use]
    pub fn remote_resource_ids(&self) -> &[RemoteResource] {
        &self.remote_resource_ids
    }

    /// Returns the id of the first resource of `kind`.
    #[must_use]
    pub fn resource_id(&self, kind: &ResourceKind) -> Option<&str> {
        self.remote_resource_ids
            .iter()
            .find(|r| &r.kind == kind)
            .map(|r| r.id.as_str())
    }

    /// Returns the resources that remain authoritative after the run.
    ///
    /// Only a completed run retains its resources; every other terminal
    /// status means they were compensated (or flagged for remediation).
    #[must_use]
    pub fn retained_resource_ids(&self) -> &[RemoteResource] {
        if self.status == DocumentStatus::Completed {
            &self.remote_resource_ids
        } else {
            &[]
        }
    }

    pub(crate) fn push_resource(&mut self, resource: RemoteResource) -> Result<(), ContextError> {
        self.ensure_open()?;
        self.remote_resource_ids.push(resource);
        Ok(())
    }

    /// Returns the extraction result, if the extract stage ran.
    #[must_use]
    pub fn extraction(&self) -> Option<&Extraction> {
        self.extraction.as_ref()
    }

    /// Stores the extraction result. Fails if it was already set.
    pub fn set_extraction(&mut self, extraction: Extraction) -> Result<(), ContextError> {
        self.ensure_open()?;
        if self.extraction.is_some() {
            return Err(ContextError::AlreadySet("extraction"));
        }
        self.extraction = Some(extraction);
        Ok(())
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    /// Returns true once a terminal status is set.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the context to a terminal status.
    pub(crate) fn finish(&mut self, next: DocumentStatus) -> Result<(), ContextError> {
        if !self.status.can_transition_to(next) {
            return Err(ContextError::TerminalStatus {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        if next == DocumentStatus::Duplicate {
            self.is_duplicate = true;
        }
        self.status = next;
        self.finished_at = Some(now_utc());
        Ok(())
    }

    /// Returns the recorded errors in order.
    #[must_use]
    pub fn errors(&self) -> &[ClassifiedError] {
        &self.errors
    }

    /// Appends an error. Ignored, with a warning, once the context is finished.
    pub fn record_error(&mut self, error: ClassifiedError) {
        if self.is_finished() {
            warn!(
                run_id = %self.run_id,
                error = %error,
                "Dropping error recorded after the run finished"
            );
            return;
        }
        self.errors.push(error);
    }

    /// Returns per-stage timing records.
    #[must_use]
    pub fn stage_records(&self) -> &[StageRecord] {
        &self.stage_records
    }

    pub(crate) fn record_stage(&mut self, record: StageRecord) {
        self.stage_records.push(record);
    }

    /// Returns when the context was created.
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns when the run reached its terminal status.
    #[must_use]
    pub fn finished_at(&self) -> Option<Timestamp> {
        self.finished_at
    }

    fn ensure_open(&self) -> Result<(), ContextError> {
        if self.is_finished() {
            Err(ContextError::Finalized(self.status.to_string()))
        } else {
            Ok(())
        }
    }
}
