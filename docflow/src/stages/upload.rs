//! Upload of the raw document to the content-addressable store.

use super::{internal, Stage};
use crate::compensation::{CleanupHandler, CompensatingTransaction, DeleteUploadedFile};
use crate::context::{ProcessingContext, ResourceKind};
use crate::core::StageOutput;
use crate::remote::{UploadRequest, UploadService};
use crate::retry::{RetryExecutor, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Uploads the document bytes and registers the file for cleanup.
#[derive(Debug, Clone)]
pub struct UploadStage {
    service: Arc<dyn UploadService>,
    cleanup: Arc<dyn CleanupHandler>,
    executor: RetryExecutor,
    policy: RetryPolicy,
}

impl UploadStage {
    /// Stage name.
    pub const NAME: &'static str = "upload";

    /// Creates the stage.
    #[must_use]
    pub fn new(
        service: Arc<dyn UploadService>,
        executor: RetryExecutor,
        policy: RetryPolicy,
    ) -> Self {
        let cleanup: Arc<dyn CleanupHandler> = Arc::new(DeleteUploadedFile::new(service.clone()));
        Self {
            service,
            cleanup,
            executor,
            policy,
        }
    }
}

#[async_trait]
impl Stage for UploadStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn creates_resources(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        ctx: &mut ProcessingContext,
        tx: &mut CompensatingTransaction,
    ) -> StageOutput {
        let Some(fingerprint) = ctx.fingerprint().cloned() else {
            return internal(Self::NAME, "upload requires a fingerprint");
        };
        let request = UploadRequest::new(fingerprint);
        let bytes = ctx.shared_bytes();

        let file_id = match self
            .executor
            .execute(&self.policy, Self::NAME, || self.service.upload(&bytes, &request))
            .await
        {
            Ok(id) => id,
            Err(err) => return StageOutput::from_retry(Self::NAME, &err),
        };

        let registered = tx.register(
            ctx,
            ResourceKind::UploadedFile,
            file_id.clone(),
            self.cleanup.clone(),
        );
        if let Err(err) = registered {
            return internal(Self::NAME, err.to_string());
        }
        info!(file_id = %file_id, fingerprint = %request.fingerprint.short(), "Uploaded document");
        StageOutput::ok()
    }
}
