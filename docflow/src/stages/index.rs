//! Registration of the document with the semantic index.

use super::{internal, Stage};
use crate::compensation::{CleanupHandler, CompensatingTransaction, DeleteIndexEntry};
use crate::context::{ProcessingContext, ResourceKind};
use crate::core::StageOutput;
use crate::remote::{IndexRequest, IndexService};
use crate::retry::{RetryExecutor, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Registers an index entry for the uploaded file and its extraction.
#[derive(Debug, Clone)]
pub struct IndexStage {
    service: Arc<dyn IndexService>,
    cleanup: Arc<dyn CleanupHandler>,
    executor: RetryExecutor,
    policy: RetryPolicy,
}

impl IndexStage {
    /// Stage name.
    pub const NAME: &'static str = "index";

    /// Creates the stage.
    #[must_use]
    pub fn new(
        service: Arc<dyn IndexService>,
        executor: RetryExecutor,
        policy: RetryPolicy,
    ) -> Self {
        let cleanup: Arc<dyn CleanupHandler> = Arc::new(DeleteIndexEntry::new(service.clone()));
        Self {
            service,
            cleanup,
            executor,
            policy,
        }
    }
}

#[async_trait]
impl Stage for IndexStage {
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
            return internal(Self::NAME, "index requires a fingerprint");
        };
        let Some(file_id) = ctx.resource_id(&ResourceKind::UploadedFile) else {
            return internal(Self::NAME, "index requires an uploaded file");
        };
        let request = IndexRequest {
            fingerprint,
            file_id: file_id.to_string(),
            payload: ctx
                .extraction()
                .map_or(serde_json::Value::Null, |e| e.payload.clone()),
        };

        let entry_id = match self
            .executor
            .execute(&self.policy, Self::NAME, || self.service.register(&request))
            .await
        {
            Ok(id) => id,
            Err(err) => return StageOutput::from_retry(Self::NAME, &err),
        };

        let registered = tx.register(
            ctx,
            ResourceKind::IndexEntry,
            entry_id.clone(),
            self.cleanup.clone(),
        );
        if let Err(err) = registered {
            return internal(Self::NAME, err.to_string());
        }
        info!(entry_id = %entry_id, file_id = %request.file_id, "Registered index entry");
        StageOutput::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compensation::{CleanupRegistry, InMemoryAuditLog};
    use crate::context::RemoteResource;
    use crate::core::{Fingerprint, StageStatus};
    use crate::errors::RemoteError;
    use crate::testing::{FakeIndexService, FakeUploadService, RecordingSleeper};
    use pretty_assertions::assert_eq;

    fn stage(service: Arc<FakeIndexService>) -> IndexStage {
        IndexStage::new(
            service,
            RetryExecutor::with_sleeper(Arc::new(RecordingSleeper::new())),
            RetryPolicy::new().with_max_attempts(2),
        )
    }

    fn scope() -> (ProcessingContext, CompensatingTransaction) {
        let mut ctx = ProcessingContext::new(b"%PDF-1.7".to_vec());
        ctx.set_fingerprint(Fingerprint::of(b"%PDF-1.7")).unwrap();
        let tx = CompensatingTransaction::begin(
            ctx.run_id(),
            CleanupRegistry::default(),
            Arc::new(InMemoryAuditLog::new()),
        );
        (ctx, tx)
    }

    #[tokio::test]
    async fn test_index_after_upload() {
        let uploads = Arc::new(FakeUploadService::new());
        let index = Arc::new(FakeIndexService::new());
        let (mut ctx, mut tx) = scope();
        uploads.seed("file-1");
        tx.register(
            &mut ctx,
            ResourceKind::UploadedFile,
            "file-1",
            Arc::new(crate::compensation::DeleteUploadedFile::new(uploads)),
        )
        .unwrap();

        let output = stage(index.clone()).execute(&mut ctx, &mut tx).await;

        assert!(output.is_continue());
        let kinds: Vec<ResourceKind> = ctx
            .remote_resource_ids()
            .iter()
            .map(|r: &RemoteResource| r.kind.clone())
            .collect();
        assert_eq!(kinds, vec![ResourceKind::UploadedFile, ResourceKind::IndexEntry]);
        assert_eq!(index.requests()[0].file_id, "file-1");
        assert_eq!(tx.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_index_without_upload_is_fatal() {
        let index = Arc::new(FakeIndexService::new());
        let (mut ctx, mut tx) = scope();

        let output = stage(index.clone()).execute(&mut ctx, &mut tx).await;

        assert_eq!(output.status(), StageStatus::Fatal);
        assert!(index.requests().is_empty());
    }

    #[tokio::test]
    async fn test_index_exhaustion_is_fatal() {
        let index = Arc::new(FakeIndexService::new());
        index.fail_next_register(RemoteError::server("a"));
        index.fail_next_register(RemoteError::server("b"));
        let (mut ctx, mut tx) = scope();
        tx.register(
            &mut ctx,
            ResourceKind::UploadedFile,
            "file-1",
            Arc::new(crate::compensation::DeleteUploadedFile::new(Arc::new(
                FakeUploadService::new(),
            ))),
        )
        .unwrap();

        let output = stage(index).execute(&mut ctx, &mut tx).await;

        assert_eq!(output.status(), StageStatus::Fatal);
        assert_eq!(tx.pending_count(), 1);
    }
}
