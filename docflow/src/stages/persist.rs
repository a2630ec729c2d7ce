//! Durable commit of the processed document.

use super::{internal, Stage};
use crate::compensation::{CommitOutcome, CompensatingTransaction};
use crate::context::ProcessingContext;
use crate::core::{ClassifiedError, ErrorKind, StageOutput};
use crate::storage::{DocumentRecord, DocumentStore, RecordStatus};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Inserts the document record and settles the compensating transaction.
///
/// A uniqueness conflict means another run committed the same content
/// first; the run is reclassified as a duplicate after its own resources
/// are unwound.
#[derive(Debug, Clone)]
pub struct PersistStage {
    store: Arc<dyn DocumentStore>,
}

impl PersistStage {
    /// Stage name.
    pub const NAME: &'static str = "persist";

    /// Creates the stage.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for PersistStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn commits(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        ctx: &mut ProcessingContext,
        tx: &mut CompensatingTransaction,
    ) -> StageOutput {
        let Some(fingerprint) = ctx.fingerprint().cloned() else {
            return internal(Self::NAME, "persist requires a fingerprint");
        };
        let mut record = DocumentRecord::new(fingerprint.clone(), ctx.run_id())
            .with_resources(ctx.remote_resource_ids().to_vec());
        if let Some(extraction) = ctx.extraction() {
            record = record.with_extraction(extraction.payload.clone());
        }

        let store = Arc::clone(&self.store);
        let outcome = tx
            .commit(ctx, Self::NAME, move || async move {
                store.insert_if_absent(record).await
            })
            .await;

        match outcome {
            CommitOutcome::Committed => {
                if let Err(err) = self
                    .store
                    .mark_status(&fingerprint, RecordStatus::Completed)
                    .await
                {
                    warn!(
                        fingerprint = %fingerprint.short(),
                        error = %err,
                        "Committed record could not be marked completed"
                    );
                    ctx.record_error(ClassifiedError::new(
                        ErrorKind::Internal,
                        Self::NAME,
                        format!("failed to mark record completed: {err}"),
                    ));
                }
                info!(fingerprint = %fingerprint.short(), "Persisted document");
                StageOutput::ok()
            }
            CommitOutcome::Conflict(report) => {
                ctx.record_error(ClassifiedError::new(
                    ErrorKind::DurableConflict,
                    Self::NAME,
                    format!(
                        "fingerprint {} was committed by another run; unwound {} resources",
                        fingerprint.short(),
                        report.records.len()
                    ),
                ));
                if let Err(err) = ctx.mark_duplicate() {
                    return internal(Self::NAME, err.to_string());
                }
                StageOutput::skip("durable conflict")
            }
            CommitOutcome::Failed { error, .. } => StageOutput::fatal(ClassifiedError::new(
                ErrorKind::CommitFailed,
                Self::NAME,
                error.to_string(),
            )),
        }
    }
}
