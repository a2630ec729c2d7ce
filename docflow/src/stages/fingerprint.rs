//! Content fingerprinting and duplicate detection.

use super::{internal, Stage};
use crate::compensation::CompensatingTransaction;
use crate::context::ProcessingContext;
use crate::core::{ClassifiedError, ErrorKind, Fingerprint, StageKind, StageOutput};
use crate::storage::DocumentStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Computes the document fingerprint and short-circuits known duplicates.
///
/// The lookup is only a fast path. Two concurrent runs of the same content
/// can both miss here; the store's uniqueness constraint decides at commit.
#[derive(Debug, Clone)]
pub struct FingerprintStage {
    store: Arc<dyn DocumentStore>,
}

impl FingerprintStage {
    /// Stage name.
    pub const NAME: &'static str = "fingerprint";

    /// Creates the stage.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for FingerprintStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Enrich
    }

    async fn execute(
        &self,
        ctx: &mut ProcessingContext,
        _tx: &mut CompensatingTransaction,
    ) -> StageOutput {
        let fingerprint = Fingerprint::of(ctx.raw_bytes());
        if let Err(err) = ctx.set_fingerprint(fingerprint.clone()) {
            return internal(Self::NAME, err.to_string());
        }

        match self.store.find_by_fingerprint(&fingerprint).await {
            Ok(Some(existing)) => {
                info!(
                    fingerprint = %fingerprint.short(),
                    original_run = %existing.run_id,
                    "Duplicate document"
                );
                if let Err(err) = ctx.mark_duplicate() {
                    return internal(Self::NAME, err.to_string());
                }
                StageOutput::skip(format!("duplicate of run {}", existing.run_id))
            }
            Ok(None) => {
                debug!(fingerprint = %fingerprint.short(), "New document");
                StageOutput::ok()
            }
            Err(err) => StageOutput::fatal(ClassifiedError::new(
                ErrorKind::Internal,
                Self::NAME,
                format!("fingerprint lookup failed: {err}"),
            )),
        }
    }
}
