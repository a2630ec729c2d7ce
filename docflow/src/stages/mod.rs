//! Stage trait and the standard document stages.
//!
//! Stages are the units of work the pipeline engine runs in order over a
//! [`ProcessingContext`]. A stage that creates remote resources must declare
//! it through [`Stage::creates_resources`] and register every resource with
//! the [`CompensatingTransaction`] immediately after creating it.

mod extract;
mod fingerprint;
mod index;
mod persist;
mod ports;
mod upload;
mod validate;

pub use extract::ExtractStage;
pub use fingerprint::FingerprintStage;
pub use index::IndexStage;
pub use persist::PersistStage;
pub use ports::ServicePorts;
pub use upload::UploadStage;
pub use validate::ValidateStage;

use crate::compensation::CompensatingTransaction;
use crate::context::ProcessingContext;
use crate::core::{ClassifiedError, ErrorKind, StageKind, StageOutput};
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the unique stage name.
    fn name(&self) -> &str;

    /// Returns the stage kind.
    fn kind(&self) -> StageKind {
        StageKind::Work
    }

    /// Declares that the stage registers remote resources.
    fn creates_resources(&self) -> bool {
        false
    }

    /// Declares that the stage performs the durable commit.
    fn commits(&self) -> bool {
        false
    }

    /// Executes the stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The document's processing context
    /// * `tx` - The run's compensating transaction
    async fn execute(
        &self,
        ctx: &mut ProcessingContext,
        tx: &mut CompensatingTransaction,
    ) -> StageOutput;
}

/// A synchronous function-based stage.
pub struct FnStage<F>
where
    F: Fn(&mut ProcessingContext) -> StageOutput + Send + Sync,
{
    name: String,
    kind: StageKind,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&mut ProcessingContext) -> StageOutput + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Transform,
            func,
        }
    }

    /// Sets the stage kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&mut ProcessingContext) -> StageOutput + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&mut ProcessingContext) -> StageOutput + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn execute(
        &self,
        ctx: &mut ProcessingContext,
        _tx: &mut CompensatingTransaction,
    ) -> StageOutput {
        (self.func)(ctx)
    }
}

/// Builds a fatal output for a broken internal invariant.
pub(crate) fn internal(stage: &str, message: impl Into<String>) -> StageOutput {
    StageOutput::fatal(ClassifiedError::new(ErrorKind::Internal, stage, message))
}
