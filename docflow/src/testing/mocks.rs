//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Barrier;

use super::{CallJournal, FakeUploadService};
use crate::compensation::{CommitOutcome, CompensatingTransaction, DeleteUploadedFile};
use crate::context::{ProcessingContext, ResourceKind};
use crate::core::{ClassifiedError, ErrorKind, Fingerprint, StageKind, StageOutput};
use crate::remote::{UploadRequest, UploadService};
use crate::stages::Stage;

/// A stage that records calls and returns a configurable output.
///
/// A committing variant settles the transaction with an always-succeeding
/// durable write before returning its output.
#[derive(Debug)]
pub struct ScriptedStage {
    name: String,
    kind: StageKind,
    commits: bool,
    output: Mutex<StageOutput>,
    call_count: Mutex<usize>,
    journal: Option<Arc<CallJournal>>,
}

impl ScriptedStage {
    /// Creates a stage returning `Continue`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Work,
            commits: false,
            output: Mutex::new(StageOutput::ok()),
            call_count: Mutex::new(0),
            journal: None,
        }
    }

    /// Creates a stage returning `output`.
    #[must_use]
    pub fn returning(name: impl Into<String>, output: StageOutput) -> Self {
        let stage = Self::new(name);
        *stage.output.lock() = output;
        stage
    }

    /// Creates a stage that fails with an error of `kind`.
    #[must_use]
    pub fn failing(name: impl Into<String>, kind: ErrorKind) -> Self {
        let name = name.into();
        let error = ClassifiedError::new(kind, name.clone(), format!("{name} failed"));
        Self::returning(name, StageOutput::fatal(error))
    }

    /// Creates a committing stage.
    #[must_use]
    pub fn committing(name: impl Into<String>) -> Self {
        let mut stage = Self::new(name);
        stage.commits = true;
        stage
    }

    /// Records `stage <name>` in `journal` on every call.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<CallJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Sets the output to return.
    pub fn set_output(&self, output: StageOutput) {
        *self.output.lock() = output;
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    fn commits(&self) -> bool {
        self.commits
    }

    async fn execute(
        &self,
        ctx: &mut ProcessingContext,
        tx: &mut CompensatingTransaction,
    ) -> StageOutput {
        *self.call_count.lock() += 1;
        if let Some(journal) = &self.journal {
            journal.record(format!("stage {}", self.name));
        }
        if self.commits {
            let outcome = tx.commit(ctx, &self.name, || async { Ok(()) }).await;
            if !matches!(outcome, CommitOutcome::Committed) {
                return StageOutput::fatal(ClassifiedError::new(
                    ErrorKind::CommitFailed,
                    self.name.clone(),
                    "scripted commit failed",
                ));
            }
        }
        self.output.lock().clone()
    }
}

/// A stage that uploads the document through a fake and registers it.
///
/// The undeclared variant performs the same work without declaring
/// `creates_resources`.
#[derive(Debug)]
pub struct ResourceStage {
    name: String,
    uploads: Arc<FakeUploadService>,
    declared: bool,
    output: StageOutput,
}

impl ResourceStage {
    /// Creates a declared resource stage.
    #[must_use]
    pub fn new(name: impl Into<String>, uploads: Arc<FakeUploadService>) -> Self {
        Self {
            name: name.into(),
            uploads,
            declared: true,
            output: StageOutput::ok(),
        }
    }

    /// Creates a stage that registers a resource without declaring it.
    #[must_use]
    pub fn undeclared(name: impl Into<String>, uploads: Arc<FakeUploadService>) -> Self {
        let mut stage = Self::new(name, uploads);
        stage.declared = false;
        stage
    }

    /// Returns `output` after registering the resource.
    #[must_use]
    pub fn then(mut self, output: StageOutput) -> Self {
        self.output = output;
        self
    }
}

#[async_trait]
impl Stage for ResourceStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn creates_resources(&self) -> bool {
        self.declared
    }

    async fn execute(
        &self,
        ctx: &mut ProcessingContext,
        tx: &mut CompensatingTransaction,
    ) -> StageOutput {
        let request = UploadRequest::new(Fingerprint::of(ctx.raw_bytes()));
        let id = match self.uploads.upload(ctx.raw_bytes(), &request).await {
            Ok(id) => id,
            Err(err) => {
                return StageOutput::fatal(ClassifiedError::new(
                    ErrorKind::NonRetryableRemote,
                    self.name.clone(),
                    err.to_string(),
                ))
            }
        };
        let handler = Arc::new(DeleteUploadedFile::new(self.uploads.clone()));
        if let Err(err) = tx.register(ctx, ResourceKind::UploadedFile, id, handler) {
            return StageOutput::fatal(ClassifiedError::new(
                ErrorKind::Internal,
                self.name.clone(),
                err.to_string(),
            ));
        }
        self.output.clone()
    }
}

/// A stage that panics.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
    first_byte: Option<u8>,
}

impl PanickingStage {
    /// Creates a stage that always panics.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            first_byte: None,
        }
    }

    /// Creates a stage that panics only for documents starting with `byte`.
    #[must_use]
    pub fn when_first_byte(name: impl Into<String>, byte: u8) -> Self {
        Self {
            name: name.into(),
            first_byte: Some(byte),
        }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        ctx: &mut ProcessingContext,
        _tx: &mut CompensatingTransaction,
    ) -> StageOutput {
        let triggered = match self.first_byte {
            Some(byte) => ctx.raw_bytes().first() == Some(&byte),
            None => true,
        };
        if triggered {
            panic!("{} panicked", self.name);
        }
        StageOutput::ok()
    }
}

/// A stage that waits until every participant reaches the barrier.
///
/// Used to force concurrent runs past the dedup check together.
#[derive(Debug)]
pub struct BarrierStage {
    name: String,
    barrier: Arc<Barrier>,
}

impl BarrierStage {
    /// Creates a barrier stage.
    #[must_use]
    pub fn new(name: impl Into<String>, barrier: Arc<Barrier>) -> Self {
        Self {
            name: name.into(),
            barrier,
        }
    }
}

#[async_trait]
impl Stage for BarrierStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _ctx: &mut ProcessingContext,
        _tx: &mut CompensatingTransaction,
    ) -> StageOutput {
        self.barrier.wait().await;
        StageOutput::ok()
    }
}
