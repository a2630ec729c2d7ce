//! End-to-end tests of the engine, the transaction manager and the standard
//! stages running against in-memory fakes.

use super::{Pipeline, WorkerPool};
use crate::cancellation::CancellationToken;
use crate::compensation::{
    orphaned_resources, AuditOutcome, CompensatingTransaction, CompensationTrigger,
};
use crate::context::{ProcessingContext, ResourceKind};
use crate::core::{DocumentStatus, ErrorKind, Fingerprint, StageOutput};
use crate::errors::{RemoteError, StoreError};
use crate::events::PipelineEvent;
use crate::stages::{
    ExtractStage, FingerprintStage, FnStage, IndexStage, PersistStage, ServicePorts, Stage,
    UploadStage, ValidateStage,
};
use crate::storage::{DocumentStore, MockDocumentStore, RecordStatus};
use crate::testing::{
    assert_error_kinds, assert_no_orphans, assert_status, sample_pdf, BarrierStage,
    ResourceStage, ScriptedStage, TestHarness,
};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

fn standard(harness: &TestHarness) -> Pipeline {
    harness.pipeline().unwrap()
}

/// The standard stages with a barrier between fingerprinting and extraction.
fn racing_pipeline(harness: &TestHarness, barrier: Arc<Barrier>) -> Pipeline {
    let ports = harness.ports();
    let config = &harness.config;
    harness
        .builder("race")
        .stage(Arc::new(ValidateStage::new(config.max_document_bytes, true)))
        .unwrap()
        .stage(Arc::new(FingerprintStage::new(ports.store.clone())))
        .unwrap()
        .stage(Arc::new(BarrierStage::new("barrier", barrier)))
        .unwrap()
        .stage(Arc::new(ExtractStage::new(
            ports.extraction.clone(),
            ports.executor.clone(),
            config.extraction_policy(),
        )))
        .unwrap()
        .stage(Arc::new(UploadStage::new(
            ports.uploads.clone(),
            ports.executor.clone(),
            config.upload_policy(),
        )))
        .unwrap()
        .stage(Arc::new(IndexStage::new(
            ports.index.clone(),
            ports.executor.clone(),
            config.index_policy(),
        )))
        .unwrap()
        .stage(Arc::new(PersistStage::new(ports.store.clone())))
        .unwrap()
        .build()
        .unwrap()
}

fn with_store(harness: &TestHarness, store: MockDocumentStore) -> Pipeline {
    let ports = ServicePorts {
        store: Arc::new(store),
        ..harness.ports()
    };
    crate::pipeline::standard_pipeline(&harness.config, &ports)
        .unwrap()
        .with_audit_sink(harness.audit.clone())
        .with_event_sink(harness.events.clone())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_happy_path_completes() {
    let harness = TestHarness::new();
    let bytes = sample_pdf(1);

    let ctx = standard(&harness).run(bytes.clone()).await;

    assert_status(&ctx, DocumentStatus::Completed);
    assert!(ctx.errors().is_empty());
    assert!(!ctx.is_duplicate());
    assert_eq!(ctx.fingerprint(), Some(&Fingerprint::of(&bytes)));
    assert_eq!(ctx.retained_resource_ids().len(), 2);
    assert_eq!(
        harness.journal.entries(),
        vec![
            "upload uploaded-file:file-1".to_string(),
            "register index-entry:entry-1".to_string(),
        ]
    );

    let record = harness.store.get(&Fingerprint::of(&bytes)).unwrap();
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.run_id, ctx.run_id());

    let audit = harness.audit.entries();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome, AuditOutcome::Success);
    assert!(!audit[0].compensation_ran);
    assert_eq!(audit[0].resources, ctx.retained_resource_ids().to_vec());
}

#[tokio::test]
async fn test_happy_path_events() {
    let harness = TestHarness::new();
    let ctx = standard(&harness).run(sample_pdf(1)).await;

    let mut expected = vec![PipelineEvent::DocumentStarted];
    for _ in 0..6 {
        expected.push(PipelineEvent::StageStarted);
        expected.push(PipelineEvent::StageCompleted);
    }
    expected.push(PipelineEvent::DocumentFinished);
    assert_eq!(harness.events.kinds(), expected);
    assert_eq!(harness.events.for_run(ctx.run_id()).len(), expected.len());
    assert_eq!(
        harness.events.stage_history(ctx.run_id(), "upload"),
        vec![PipelineEvent::StageStarted, PipelineEvent::StageCompleted]
    );

    let finished = harness.events.of_kind(PipelineEvent::DocumentFinished);
    assert_eq!(finished[0].stage, None);
    assert_eq!(finished[0].payload["status"], "completed");
    assert_eq!(finished[0].payload["stage_counts"]["ok"], 6);
}

#[tokio::test]
async fn test_same_bytes_twice_is_duplicate() {
    let harness = TestHarness::new();
    let pipeline = standard(&harness);
    let bytes = sample_pdf(1);

    let first = pipeline.run(bytes.clone()).await;
    let second = pipeline.run(bytes.clone()).await;

    assert_status(&first, DocumentStatus::Completed);
    assert_status(&second, DocumentStatus::Duplicate);
    assert!(second.is_duplicate());
    assert!(second.retained_resource_ids().is_empty());
    assert!(second.remote_resource_ids().is_empty());
    assert_eq!(harness.store.len(), 1);
    assert_eq!(harness.uploads.upload_calls(), 1);
    assert_eq!(harness.extraction.calls(), 1);
    assert_eq!(
        harness.store.get(&Fingerprint::of(&bytes)).unwrap().resources,
        first.retained_resource_ids().to_vec()
    );
    assert_eq!(harness.audit.len(), 1);
    assert_no_orphans(&[first, second], &harness.uploads, &harness.index);
}

#[tokio::test]
async fn test_commit_failure_unwinds_in_reverse_order() {
    let harness = TestHarness::new();
    let mut store = MockDocumentStore::new();
    store.expect_find_by_fingerprint().returning(|_| Ok(None));
    store
        .expect_insert_if_absent()
        .times(1)
        .returning(|_| Err(StoreError::Backend("disk full".to_string())));
    store.expect_mark_status().never();

    let ctx = with_store(&harness, store).run(sample_pdf(1)).await;

    assert_status(&ctx, DocumentStatus::Failed);
    assert_error_kinds(&ctx, &[ErrorKind::CommitFailed]);
    assert_eq!(
        harness.journal.entries(),
        vec![
            "upload uploaded-file:file-1".to_string(),
            "register index-entry:entry-1".to_string(),
            "delete index-entry:entry-1".to_string(),
            "delete uploaded-file:file-1".to_string(),
        ]
    );
    assert!(ctx.retained_resource_ids().is_empty());
    assert_eq!(ctx.remote_resource_ids().len(), 2);

    let audit = harness.audit.entries();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].trigger, Some(CompensationTrigger::CommitFailed));
    assert_eq!(audit[0].actions.len(), 2);
    assert!(!audit[0].requires_remediation);
    assert_no_orphans(&[ctx], &harness.uploads, &harness.index);
}

#[tokio::test]
async fn test_fatal_after_k_resources_runs_k_cleanups() {
    let harness = TestHarness::new();
    let pipeline = harness
        .builder("k")
        .stage(Arc::new(ResourceStage::new("a", harness.uploads.clone())))
        .unwrap()
        .stage(Arc::new(ResourceStage::new("b", harness.uploads.clone())))
        .unwrap()
        .stage(Arc::new(ResourceStage::new("c", harness.uploads.clone())))
        .unwrap()
        .stage(Arc::new(ScriptedStage::failing("boom", ErrorKind::Internal)))
        .unwrap()
        .stage(Arc::new(ScriptedStage::committing("persist")))
        .unwrap()
        .build()
        .unwrap();

    let ctx = pipeline.run(sample_pdf(1)).await;

    assert_status(&ctx, DocumentStatus::Failed);
    assert_eq!(
        harness.journal.entries_with_prefix("delete"),
        vec![
            "delete uploaded-file:file-3".to_string(),
            "delete uploaded-file:file-2".to_string(),
            "delete uploaded-file:file-1".to_string(),
        ]
    );
    assert_eq!(harness.audit.entries()[0].trigger, Some(CompensationTrigger::StageFailed));
    assert!(harness.uploads.live_ids().is_empty());
}

#[tokio::test]
async fn test_upload_retry_bound() {
    let harness = TestHarness::new();
    for _ in 0..5 {
        harness.uploads.fail_next_upload(RemoteError::server("503"));
    }

    let ctx = standard(&harness).run(sample_pdf(1)).await;

    assert_status(&ctx, DocumentStatus::Failed);
    assert_error_kinds(&ctx, &[ErrorKind::RetryExhausted]);
    assert_eq!(ctx.errors()[0].attempts, Some(5));
    assert_eq!(harness.uploads.upload_calls(), 5);
    assert_eq!(
        harness.sleeper.recorded(),
        vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
            Duration::from_secs(16),
        ]
    );
    assert!(harness.store.is_empty());
    assert_eq!(harness.index.register_calls(), 0);
    assert!(harness.audit.is_empty());
}

#[tokio::test]
async fn test_non_retryable_fails_after_one_attempt() {
    let harness = TestHarness::new();
    harness
        .extraction
        .fail_next(RemoteError::from_status(404, "model not found"));

    let ctx = standard(&harness).run(sample_pdf(1)).await;

    assert_status(&ctx, DocumentStatus::Failed);
    assert_error_kinds(&ctx, &[ErrorKind::NonRetryableRemote]);
    assert_eq!(harness.extraction.calls(), 1);
    assert!(harness.sleeper.recorded().is_empty());
    assert_eq!(harness.uploads.upload_calls(), 0);
}

#[tokio::test]
async fn test_invalid_input_stops_before_remote_calls() {
    let harness = TestHarness::new();

    let ctx = standard(&harness).run(b"hello world".to_vec()).await;

    assert_status(&ctx, DocumentStatus::Failed);
    assert_error_kinds(&ctx, &[ErrorKind::Validation]);
    assert!(ctx.fingerprint().is_none());
    assert!(harness.journal.entries().is_empty());
    assert_eq!(harness.extraction.calls(), 0);
    assert_eq!(harness.events.of_kind(PipelineEvent::StageFailed).len(), 1);
}

#[tokio::test]
async fn test_concurrent_identical_runs_resolve_to_one_winner() {
    let harness = TestHarness::new();
    let barrier = Arc::new(Barrier::new(2));
    let pipeline = racing_pipeline(&harness, barrier);
    let bytes = sample_pdf(1);

    let (a, b) = tokio::join!(pipeline.run(bytes.clone()), pipeline.run(bytes.clone()));

    let mut statuses = vec![a.status(), b.status()];
    statuses.sort_by_key(ToString::to_string);
    assert_eq!(statuses, vec![DocumentStatus::Completed, DocumentStatus::Duplicate]);

    let (winner, loser) = if a.status() == DocumentStatus::Completed {
        (&a, &b)
    } else {
        (&b, &a)
    };
    assert!(loser.is_duplicate());
    assert_error_kinds(loser, &[ErrorKind::DurableConflict]);
    assert!(loser.retained_resource_ids().is_empty());
    assert_eq!(loser.remote_resource_ids().len(), 2);

    assert_eq!(harness.uploads.upload_calls(), 2);
    assert_eq!(harness.uploads.live_ids().len(), 1);
    assert_eq!(harness.index.live_ids().len(), 1);
    assert_eq!(harness.store.len(), 1);
    assert_eq!(
        harness.store.get(&Fingerprint::of(&bytes)).unwrap().run_id,
        winner.run_id()
    );

    let audit = harness.audit.entries();
    assert_eq!(audit.len(), 2);
    let conflict = audit
        .iter()
        .find(|e| e.outcome == AuditOutcome::Failure)
        .unwrap();
    assert_eq!(conflict.trigger, Some(CompensationTrigger::DurableConflict));
    assert_eq!(conflict.run_id, loser.run_id());
    assert!(!conflict.requires_remediation);

    assert_no_orphans(&[a.clone(), b.clone()], &harness.uploads, &harness.index);
}

#[tokio::test]
async fn test_failed_cleanup_flags_remediation() {
    let harness = TestHarness::new();
    harness
        .index
        .fail_next_register(RemoteError::from_status(404, "collection missing"));
    harness
        .uploads
        .fail_deletes_with(RemoteError::server("storage unavailable"));

    let ctx = standard(&harness).run(sample_pdf(1)).await;

    assert_status(&ctx, DocumentStatus::Failed);
    assert_error_kinds(
        &ctx,
        &[ErrorKind::NonRetryableRemote, ErrorKind::CompensationFailure],
    );

    let audit = harness.audit.entries();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].requires_remediation);
    assert_eq!(audit[0].failed_actions().count(), 1);

    let orphans = orphaned_resources(&audit);
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].resource.kind, ResourceKind::UploadedFile);
    assert_eq!(orphans[0].run_id, ctx.run_id());
    assert_eq!(harness.uploads.live_ids(), vec![orphans[0].resource.id.clone()]);
}

#[tokio::test]
async fn test_undeclared_side_effect_is_fatal() {
    let harness = TestHarness::new();
    let pipeline = harness
        .builder("leaky")
        .stage(Arc::new(ResourceStage::undeclared("sneaky", harness.uploads.clone())))
        .unwrap()
        .stage(Arc::new(ScriptedStage::committing("persist")))
        .unwrap()
        .build()
        .unwrap();

    let ctx = pipeline.run(sample_pdf(1)).await;

    assert_status(&ctx, DocumentStatus::Failed);
    assert_error_kinds(&ctx, &[ErrorKind::UndeclaredSideEffect]);
    assert!(harness.uploads.live_ids().is_empty());
    assert_eq!(
        harness.audit.entries()[0].trigger,
        Some(CompensationTrigger::UndeclaredSideEffect)
    );
}

#[tokio::test]
async fn test_skip_unwinds_pending_resources() {
    let harness = TestHarness::new();
    let pipeline = harness
        .builder("skip")
        .stage(Arc::new(
            ResourceStage::new("upload", harness.uploads.clone())
                .then(StageOutput::skip("seen elsewhere")),
        ))
        .unwrap()
        .stage(Arc::new(ScriptedStage::committing("persist")))
        .unwrap()
        .build()
        .unwrap();

    let ctx = pipeline.run(sample_pdf(1)).await;

    assert_status(&ctx, DocumentStatus::Duplicate);
    assert!(ctx.is_duplicate());
    assert!(harness.uploads.live_ids().is_empty());
    assert_eq!(
        harness.audit.entries()[0].trigger,
        Some(CompensationTrigger::ShortCircuit)
    );
    assert_eq!(harness.events.of_kind(PipelineEvent::CompensationRan).len(), 1);
}

/// Declares a commit but never settles the transaction.
#[derive(Debug)]
struct ForgetfulCommit;

#[async_trait]
impl Stage for ForgetfulCommit {
    fn name(&self) -> &str {
        "forgetful"
    }

    fn commits(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _ctx: &mut ProcessingContext,
        _tx: &mut CompensatingTransaction,
    ) -> StageOutput {
        StageOutput::ok()
    }
}

#[tokio::test]
async fn test_uncommitted_resources_fail_the_run() {
    let harness = TestHarness::new();
    let pipeline = harness
        .builder("no-commit")
        .stage(Arc::new(ResourceStage::new("upload", harness.uploads.clone())))
        .unwrap()
        .stage(Arc::new(ForgetfulCommit))
        .unwrap()
        .build()
        .unwrap();

    let ctx = pipeline.run(sample_pdf(1)).await;

    assert_status(&ctx, DocumentStatus::Failed);
    assert_error_kinds(&ctx, &[ErrorKind::Internal]);
    assert!(harness.uploads.live_ids().is_empty());
    assert_eq!(
        harness.audit.entries()[0].trigger,
        Some(CompensationTrigger::NoCommit)
    );
}

#[tokio::test]
async fn test_cancellation_between_stages() {
    let harness = TestHarness::new();
    let token = Arc::new(CancellationToken::new());
    let trigger = token.clone();
    let persist = Arc::new(ScriptedStage::committing("persist"));
    let pipeline = harness
        .builder("cancel")
        .stage(Arc::new(ResourceStage::new("upload", harness.uploads.clone())))
        .unwrap()
        .stage(Arc::new(FnStage::new("stop", move |_| {
            trigger.cancel("shutdown");
            StageOutput::ok()
        })))
        .unwrap()
        .stage(persist.clone())
        .unwrap()
        .build()
        .unwrap();

    let ctx = pipeline.run_with_cancellation(sample_pdf(1), &token).await;

    assert_status(&ctx, DocumentStatus::Failed);
    assert_error_kinds(&ctx, &[ErrorKind::Cancelled]);
    assert!(ctx.errors()[0].message.contains("shutdown"));
    assert_eq!(persist.call_count(), 0);
    assert!(harness.uploads.live_ids().is_empty());
    assert_eq!(
        harness.audit.entries()[0].trigger,
        Some(CompensationTrigger::Cancelled)
    );
    let cancelled = harness.events.of_kind(PipelineEvent::DocumentCancelled);
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].stage.as_deref(), Some("persist"));
}

#[tokio::test]
async fn test_dropped_run_unwinds_in_background() {
    let harness = TestHarness::new();
    let never = Arc::new(Barrier::new(2));
    let pipeline = harness
        .builder("dropped")
        .stage(Arc::new(ResourceStage::new("upload", harness.uploads.clone())))
        .unwrap()
        .stage(Arc::new(BarrierStage::new("wait", never)))
        .unwrap()
        .stage(Arc::new(ScriptedStage::committing("persist")))
        .unwrap()
        .build()
        .unwrap();

    let timed_out = tokio::time::timeout(Duration::from_millis(20), pipeline.run(sample_pdf(1)))
        .await
        .is_err();
    assert!(timed_out);

    for _ in 0..100 {
        if harness.audit.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(harness.uploads.live_ids().is_empty());
    assert_eq!(
        harness.audit.entries()[0].trigger,
        Some(CompensationTrigger::ScopeDropped)
    );
}

#[tokio::test]
async fn test_panicking_stage_unwinds_and_fails() {
    let harness = TestHarness::new();
    let pipeline = harness
        .builder("panic")
        .stage(Arc::new(ResourceStage::new("upload", harness.uploads.clone())))
        .unwrap()
        .stage(Arc::new(crate::testing::PanickingStage::new("explode")))
        .unwrap()
        .stage(Arc::new(ScriptedStage::committing("persist")))
        .unwrap()
        .build()
        .unwrap();

    let ctx = pipeline.run(sample_pdf(1)).await;

    assert_status(&ctx, DocumentStatus::Failed);
    assert_error_kinds(&ctx, &[ErrorKind::Internal]);
    assert!(ctx.errors()[0].message.contains("explode panicked"));
    assert!(harness.uploads.live_ids().is_empty());
}

#[tokio::test]
async fn test_mark_status_failure_keeps_commit() {
    let harness = TestHarness::new();
    let mut store = MockDocumentStore::new();
    store.expect_find_by_fingerprint().returning(|_| Ok(None));
    store.expect_insert_if_absent().times(1).returning(|_| Ok(()));
    store
        .expect_mark_status()
        .times(1)
        .returning(|_, _| Err(StoreError::Backend("lock timeout".to_string())));

    let ctx = with_store(&harness, store).run(sample_pdf(1)).await;

    assert_status(&ctx, DocumentStatus::Completed);
    assert_error_kinds(&ctx, &[ErrorKind::Internal]);
    assert_eq!(harness.uploads.live_ids().len(), 1);
    assert_eq!(ctx.retained_resource_ids().len(), 2);
}

#[tokio::test]
async fn test_pool_batch_with_duplicates_leaves_no_orphans() {
    let harness = TestHarness::new();
    harness.uploads.fail_next_upload(RemoteError::from_status(413, "too large"));
    let pool = WorkerPool::new(Arc::new(standard(&harness)), 3);
    let docs: Vec<Vec<u8>> = vec![
        sample_pdf(1),
        sample_pdf(2),
        sample_pdf(1),
        sample_pdf(3),
        sample_pdf(2),
        sample_pdf(4),
    ];

    let results = pool.process_all(docs.clone()).await;

    assert_eq!(results.len(), docs.len());
    for (ctx, doc) in results.iter().zip(&docs) {
        assert!(ctx.is_finished());
        assert_eq!(ctx.raw_bytes(), doc.as_slice());
    }
    let completed = results
        .iter()
        .filter(|c| c.status() == DocumentStatus::Completed)
        .count();
    let failed = results
        .iter()
        .filter(|c| c.status() == DocumentStatus::Failed)
        .count();
    assert_eq!(failed, 1);
    assert_eq!(completed, harness.store.len());
    assert_no_orphans(&results, &harness.uploads, &harness.index);

    for fingerprint in results.iter().filter_map(ProcessingContext::fingerprint) {
        let found = harness.store.find_by_fingerprint(fingerprint).await.unwrap();
        if let Some(record) = found {
            assert_eq!(record.status, RecordStatus::Completed);
        }
    }
}
