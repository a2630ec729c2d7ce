//! Sequential execution of a pipeline over one document.

use crate::cancellation::CancellationToken;
use crate::compensation::{
    AuditSink, CleanupRegistry, CompensatingTransaction, CompensationTrigger,
};
use crate::context::{ProcessingContext, StageRecord};
use crate::core::{ClassifiedError, DocumentStatus, ErrorKind, StageOutput};
use crate::events::{Event, EventSink, PipelineEvent};
use crate::observability::{document_payload, stage_payload};
use crate::stages::Stage;
use crate::utils::now_utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// A validated, ordered list of stages.
///
/// Built by [`PipelineBuilder`](super::PipelineBuilder). One pipeline can run
/// any number of documents concurrently; each run gets its own context and
/// transaction.
#[derive(Debug)]
pub struct Pipeline {
    pub(super) name: String,
    pub(super) stages: Vec<Arc<dyn Stage>>,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) audit: Arc<dyn AuditSink>,
    pub(super) cleanup_timeout: Duration,
}

/// How the stage loop ended.
enum Halt {
    Completed,
    Duplicate,
    Failed,
}

impl Pipeline {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the audit sink every run writes to.
    #[must_use]
    pub fn audit_sink(&self) -> Arc<dyn AuditSink> {
        Arc::clone(&self.audit)
    }

    /// Processes one document.
    ///
    /// The returned context is always in a terminal status.
    pub async fn run(&self, raw_bytes: impl Into<Arc<[u8]>>) -> ProcessingContext {
        self.run_with_cancellation(raw_bytes, &CancellationToken::new())
            .await
    }

    /// Processes one document, checking `token` before every stage.
    pub async fn run_with_cancellation(
        &self,
        raw_bytes: impl Into<Arc<[u8]>>,
        token: &CancellationToken,
    ) -> ProcessingContext {
        let mut ctx = ProcessingContext::new(raw_bytes);
        let span = info_span!(
            "document",
            pipeline = %self.name,
            run_id = %ctx.run_id(),
            bytes = ctx.raw_bytes().len(),
        );
        self.drive(&mut ctx, token).instrument(span).await;
        ctx
    }

    async fn drive(&self, ctx: &mut ProcessingContext, token: &CancellationToken) {
        let mut tx = CompensatingTransaction::begin(
            ctx.run_id(),
            CleanupRegistry::new(self.cleanup_timeout),
            Arc::clone(&self.audit),
        );
        self.events
            .emit(Event::document(
                PipelineEvent::DocumentStarted,
                ctx.run_id(),
                serde_json::json!({
                    "pipeline": self.name,
                    "bytes": ctx.raw_bytes().len(),
                }),
            ))
            .await;

        let status = match self.run_stages(ctx, &mut tx, token).await {
            Halt::Completed => DocumentStatus::Completed,
            Halt::Duplicate => DocumentStatus::Duplicate,
            Halt::Failed => DocumentStatus::Failed,
        };
        if let Err(err) = ctx.finish(status) {
            error!(error = %err, "Could not set terminal status");
        }

        info!(
            status = %ctx.status(),
            errors = ctx.errors().len(),
            resources = ctx.retained_resource_ids().len(),
            "Document finished"
        );
        self.events
            .emit(Event::document(
                PipelineEvent::DocumentFinished,
                ctx.run_id(),
                document_payload(ctx),
            ))
            .await;
    }

    async fn run_stages(
        &self,
        ctx: &mut ProcessingContext,
        tx: &mut CompensatingTransaction,
        token: &CancellationToken,
    ) -> Halt {
        for stage in &self.stages {
            let name = stage.name();

            if token.is_cancelled() {
                let reason = token.reason().unwrap_or_default();
                warn!(stage = name, reason = %reason, "Run cancelled");
                ctx.record_error(ClassifiedError::new(
                    ErrorKind::Cancelled,
                    name,
                    format!("cancelled before stage: {reason}"),
                ));
                self.events
                    .emit(Event::stage(
                        PipelineEvent::DocumentCancelled,
                        ctx.run_id(),
                        name,
                        serde_json::json!({ "reason": reason }),
                    ))
                    .await;
                self.unwind(ctx, tx, name, CompensationTrigger::Cancelled)
                    .await;
                return Halt::Failed;
            }

            tx.enter_stage(name);
            let pending_before = tx.pending_count();
            let started_at = now_utc();
            self.events
                .emit(Event::stage(
                    PipelineEvent::StageStarted,
                    ctx.run_id(),
                    name,
                    serde_json::json!({ "kind": stage.kind().to_string() }),
                ))
                .await;

            let span = info_span!("stage", stage = name, kind = %stage.kind());
            let output = match AssertUnwindSafe(stage.execute(ctx, tx))
                .catch_unwind()
                .instrument(span)
                .await
            {
                Ok(output) => output,
                Err(panic) => {
                    error!(stage = name, "Stage panicked");
                    StageOutput::fatal(ClassifiedError::new(
                        ErrorKind::Internal,
                        name,
                        format!("stage panicked: {}", panic_message(panic.as_ref())),
                    ))
                }
            };

            let added = tx.pending_count().saturating_sub(pending_before);
            let undeclared = added > 0 && !stage.creates_resources();
            let output = if undeclared {
                error!(stage = name, added, "Stage registered resources without declaring them");
                StageOutput::fatal(ClassifiedError::new(
                    ErrorKind::UndeclaredSideEffect,
                    name,
                    format!(
                        "stage registered {added} remote resources \
                         without declaring creates_resources"
                    ),
                ))
            } else {
                output
            };

            let record = StageRecord {
                stage: name.to_string(),
                kind: stage.kind(),
                status: output.status(),
                started_at,
                ended_at: now_utc(),
            };
            let run_id = ctx.run_id();
            let payload = stage_payload(ctx, &record, &output);
            ctx.record_stage(record);

            match output {
                StageOutput::Continue => {
                    debug!(stage = name, "Stage completed");
                    self.events
                        .emit(Event::stage(PipelineEvent::StageCompleted, run_id, name, payload))
                        .await;
                }
                StageOutput::Skip { reason } => {
                    info!(stage = name, reason = %reason, "Short-circuiting run");
                    self.events
                        .emit(Event::stage(PipelineEvent::StageSkipped, run_id, name, payload))
                        .await;
                    self.unwind(ctx, tx, name, CompensationTrigger::ShortCircuit)
                        .await;
                    return Halt::Duplicate;
                }
                StageOutput::Invalid(err) => {
                    warn!(stage = name, error = %err, "Input rejected");
                    ctx.record_error(err);
                    self.events
                        .emit(Event::stage(PipelineEvent::StageFailed, run_id, name, payload))
                        .await;
                    self.unwind(ctx, tx, name, CompensationTrigger::InvalidInput)
                        .await;
                    return Halt::Failed;
                }
                StageOutput::Fatal(err) => {
                    warn!(stage = name, error = %err, "Stage failed");
                    ctx.record_error(err);
                    self.events
                        .emit(Event::stage(PipelineEvent::StageFailed, run_id, name, payload))
                        .await;
                    let trigger = if undeclared {
                        CompensationTrigger::UndeclaredSideEffect
                    } else {
                        CompensationTrigger::StageFailed
                    };
                    self.unwind(ctx, tx, name, trigger).await;
                    return Halt::Failed;
                }
            }
        }

        let pending = tx.pending_count();
        if pending > 0 {
            let last = self.stages.last().map_or("", |s| s.name());
            error!(pending, "Resources still pending after the last stage");
            ctx.record_error(ClassifiedError::new(
                ErrorKind::Internal,
                last,
                format!("{pending} remote resources were never committed"),
            ));
            self.unwind(ctx, tx, last, CompensationTrigger::NoCommit)
                .await;
            return Halt::Failed;
        }
        Halt::Completed
    }

    async fn unwind(
        &self,
        ctx: &mut ProcessingContext,
        tx: &mut CompensatingTransaction,
        stage: &str,
        trigger: CompensationTrigger,
    ) {
        let Some(report) = tx.abort(ctx, stage, trigger).await else {
            return;
        };
        self.events
            .emit(Event::stage(
                PipelineEvent::CompensationRan,
                ctx.run_id(),
                stage,
                serde_json::json!({
                    "trigger": report.trigger,
                    "actions": report.records.len(),
                    "failed": report.failed().count(),
                    "requires_remediation": report.requires_remediation,
                }),
            ))
            .await;
    }
}

/// Extracts the message from a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
