//! Scoped unit of work that undoes remote side effects on failure.

use super::audit::{AuditEntry, AuditOutcome, AuditSink, CleanupRecord, CompensationTrigger};
use super::handlers::{CleanupHandler, CleanupOutcome};
use super::registry::{run_actions, CleanupAction, CleanupRegistry};
use crate::context::{ProcessingContext, RemoteResource, ResourceKind};
use crate::core::{ClassifiedError, ErrorKind, Fingerprint};
use crate::errors::{ContextError, StoreError};
use crate::utils::{now_utc, Timestamp};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of compensating one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationReport {
    /// What caused compensation.
    pub trigger: CompensationTrigger,
    /// Per-action results in execution (LIFO) order.
    pub records: Vec<CleanupRecord>,
    /// True when at least one action failed.
    pub requires_remediation: bool,
}

impl CompensationReport {
    /// Returns the records that failed.
    pub fn failed(&self) -> impl Iterator<Item = &CleanupRecord> {
        self.records.iter().filter(|r| !r.outcome.is_success())
    }

    /// Returns true if every resource is known to be gone.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.requires_remediation
    }
}

/// Result of [`CompensatingTransaction::commit`].
#[derive(Debug)]
pub enum CommitOutcome {
    /// The durable write succeeded and pending actions were discarded.
    Committed,
    /// The durable write hit a uniqueness conflict; resources were unwound.
    Conflict(CompensationReport),
    /// The durable write failed; resources were unwound.
    Failed {
        /// The store failure.
        error: StoreError,
        /// The compensation that followed.
        report: CompensationReport,
    },
}

impl CommitOutcome {
    /// Returns true if the commit succeeded.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }
}

/// A unit of work that creates remote resources before a durable commit.
///
/// Resource-creating stages call [`register`](Self::register) immediately
/// after a remote resource is created. The id is appended to the context and
/// its cleanup action to the registry in the same call. A successful
/// [`commit`](Self::commit) discards the actions; any failure runs them in
/// reverse order and writes one audit entry.
///
/// Dropping a transaction with pending actions unwinds them on the ambient
/// tokio runtime.
#[derive(Debug)]
pub struct CompensatingTransaction {
    run_id: Uuid,
    registry: CleanupRegistry,
    audit: Arc<dyn AuditSink>,
    fingerprint: Option<Fingerprint>,
    unit_started_at: Timestamp,
    stage: String,
}

impl CompensatingTransaction {
    /// Opens a transaction scope for `run_id`.
    #[must_use]
    pub fn begin(run_id: Uuid, registry: CleanupRegistry, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            run_id,
            registry,
            audit,
            fingerprint: None,
            unit_started_at: now_utc(),
            stage: String::new(),
        }
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the number of pending cleanup actions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Returns the resources awaiting commit.
    #[must_use]
    pub fn pending_resources(&self) -> Vec<RemoteResource> {
        self.registry.pending_resources()
    }

    pub(crate) fn enter_stage(&mut self, stage: &str) {
        stage.clone_into(&mut self.stage);
    }

    /// Records a freshly created remote resource and its undo action.
    ///
    /// The cleanup action is registered even if the context rejects the id,
    /// so the resource is still released when the scope unwinds.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is already finished.
    pub fn register(
        &mut self,
        ctx: &mut ProcessingContext,
        kind: ResourceKind,
        id: impl Into<String>,
        handler: Arc<dyn CleanupHandler>,
    ) -> Result<(), ContextError> {
        if self.registry.is_empty() {
            self.unit_started_at = now_utc();
        }
        if let Some(fp) = ctx.fingerprint() {
            self.fingerprint = Some(fp.clone());
        }
        let resource = RemoteResource::new(kind, id);
        self.registry.push(CleanupAction::new(resource.clone(), handler));
        ctx.push_resource(resource)
    }

    /// Runs `durable_write` exactly once and settles the unit of work.
    ///
    /// On success the pending actions are discarded and a success audit
    /// entry lists the resources that are now authoritative. A
    /// [`StoreError::Conflict`] unwinds the resources and reports
    /// [`CommitOutcome::Conflict`]; any other error unwinds and reports
    /// [`CommitOutcome::Failed`].
    pub async fn commit<F, Fut>(
        &mut self,
        ctx: &mut ProcessingContext,
        stage: &str,
        durable_write: F,
    ) -> CommitOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        self.enter_stage(stage);
        match durable_write().await {
            Ok(()) => {
                let resources = self.registry.pending_resources();
                self.registry.discard();
                info!(
                    run_id = %self.run_id,
                    stage,
                    resources = resources.len(),
                    "Committed unit of work"
                );
                self.write_audit(AuditEntry {
                    run_id: self.run_id,
                    fingerprint: self.fingerprint_of(ctx),
                    stage: stage.to_string(),
                    started_at: self.unit_started_at,
                    ended_at: now_utc(),
                    outcome: AuditOutcome::Success,
                    trigger: None,
                    compensation_ran: false,
                    resources,
                    actions: Vec::new(),
                    requires_remediation: false,
                });
                CommitOutcome::Committed
            }
            Err(err) if err.is_conflict() => {
                info!(run_id = %self.run_id, stage, "Durable write conflicted; unwinding");
                let report = self
                    .compensate(ctx, stage, CompensationTrigger::DurableConflict)
                    .await;
                CommitOutcome::Conflict(report)
            }
            Err(err) => {
                warn!(
                    run_id = %self.run_id,
                    stage,
                    error = %err,
                    "Durable write failed; unwinding"
                );
                let report = self
                    .compensate(ctx, stage, CompensationTrigger::CommitFailed)
                    .await;
                CommitOutcome::Failed { error: err, report }
            }
        }
    }

    /// Unwinds every pending action.
    ///
    /// Returns `None` when nothing was pending; no audit entry is written in
    /// that case.
    pub async fn abort(
        &mut self,
        ctx: &mut ProcessingContext,
        stage: &str,
        trigger: CompensationTrigger,
    ) -> Option<CompensationReport> {
        if self.registry.is_empty() {
            return None;
        }
        warn!(
            run_id = %self.run_id,
            stage,
            ?trigger,
            pending = self.registry.pending_count(),
            "Aborting unit of work"
        );
        Some(self.compensate(ctx, stage, trigger).await)
    }

    async fn compensate(
        &mut self,
        ctx: &mut ProcessingContext,
        stage: &str,
        trigger: CompensationTrigger,
    ) -> CompensationReport {
        let resources = self.registry.pending_resources();
        let records = self.registry.run_all().await;
        let mut requires_remediation = false;

        for record in &records {
            if let CleanupOutcome::Failed { reason } = &record.outcome {
                requires_remediation = true;
                ctx.record_error(ClassifiedError::new(
                    ErrorKind::CompensationFailure,
                    stage,
                    format!("{} failed for {}: {reason}", record.action, record.resource),
                ));
            }
        }

        if requires_remediation {
            error!(
                run_id = %self.run_id,
                stage,
                ?trigger,
                failed = records.iter().filter(|r| !r.outcome.is_success()).count(),
                "Compensation incomplete; remediation required"
            );
        } else {
            info!(
                run_id = %self.run_id,
                stage,
                ?trigger,
                cleaned = records.len(),
                "Compensation complete"
            );
        }

        self.write_audit(AuditEntry {
            run_id: self.run_id,
            fingerprint: self.fingerprint_of(ctx),
            stage: stage.to_string(),
            started_at: self.unit_started_at,
            ended_at: now_utc(),
            outcome: AuditOutcome::Failure,
            trigger: Some(trigger),
            compensation_ran: true,
            resources,
            actions: records.clone(),
            requires_remediation,
        });

        CompensationReport {
            trigger,
            records,
            requires_remediation,
        }
    }

    fn fingerprint_of(&self, ctx: &ProcessingContext) -> Option<String> {
        ctx.fingerprint()
            .or(self.fingerprint.as_ref())
            .map(|fp| fp.as_str().to_string())
    }

    fn write_audit(&self, entry: AuditEntry) {
        if let Err(err) = self.audit.append(&entry) {
            error!(run_id = %self.run_id, error = %err, "Failed to write audit entry");
        }
    }
}

impl Drop for CompensatingTransaction {
    fn drop(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        let resources = self.registry.pending_resources();
        let actions = self.registry.discard();

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            for resource in &resources {
                error!(
                    run_id = %self.run_id,
                    resource = %resource,
                    "Leaked remote resource: no runtime available to run cleanup"
                );
            }
            let records = actions
                .iter()
                .map(|action| CleanupRecord {
                    action: action.name().to_string(),
                    resource: action.resource().clone(),
                    outcome: CleanupOutcome::failed("no runtime to run cleanup"),
                    duration_ms: 0,
                })
                .collect();
            let entry = AuditEntry {
                run_id: self.run_id,
                fingerprint: self.fingerprint.as_ref().map(|fp| fp.as_str().to_string()),
                stage: std::mem::take(&mut self.stage),
                started_at: self.unit_started_at,
                ended_at: now_utc(),
                outcome: AuditOutcome::Failure,
                trigger: Some(CompensationTrigger::ScopeDropped),
                compensation_ran: false,
                resources,
                actions: records,
                requires_remediation: true,
            };
            self.write_audit(entry);
            return;
        };

        warn!(
            run_id = %self.run_id,
            stage = %self.stage,
            pending = actions.len(),
            "Transaction dropped with pending actions; unwinding in background"
        );

        let audit = Arc::clone(&self.audit);
        let limit = self.registry.action_timeout();
        let run_id = self.run_id;
        let fingerprint = self.fingerprint.as_ref().map(|fp| fp.as_str().to_string());
        let stage = std::mem::take(&mut self.stage);
        let started_at = self.unit_started_at;

        handle.spawn(async move {
            let records = run_actions(actions, limit).await;
            let requires_remediation = records.iter().any(|r| !r.outcome.is_success());
            if requires_remediation {
                error!(%run_id, "Background compensation incomplete; remediation required");
            }
            let entry = AuditEntry {
                run_id,
                fingerprint,
                stage,
                started_at,
                ended_at: now_utc(),
                outcome: AuditOutcome::Failure,
                trigger: Some(CompensationTrigger::ScopeDropped),
                compensation_ran: true,
                resources,
                actions: records,
                requires_remediation,
            };
            if let Err(err) = audit.append(&entry) {
                error!(%run_id, error = %err, "Failed to write audit entry");
            }
        });
    }
}
