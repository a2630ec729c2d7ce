//! Structured extraction through the remote extraction service.

use super::{internal, Stage};
use crate::compensation::CompensatingTransaction;
use crate::context::ProcessingContext;
use crate::core::{StageKind, StageOutput};
use crate::remote::{ExtractionRequest, ExtractionService};
use crate::retry::{RetryExecutor, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Calls the extraction service and stores the result on the context.
#[derive(Debug, Clone)]
pub struct ExtractStage {
    service: Arc<dyn ExtractionService>,
    executor: RetryExecutor,
    policy: RetryPolicy,
    request: ExtractionRequest,
}

impl ExtractStage {
    /// Stage name.
    pub const NAME: &'static str = "extract";

    /// Creates the stage.
    #[must_use]
    pub fn new(
        service: Arc<dyn ExtractionService>,
        executor: RetryExecutor,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            service,
            executor,
            policy,
            request: ExtractionRequest::default(),
        }
    }

    /// Sets the request descriptor sent with every document.
    #[must_use]
    pub fn with_request(mut self, request: ExtractionRequest) -> Self {
        self.request = request;
        self
    }
}

#[async_trait]
impl Stage for ExtractStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn execute(
        &self,
        ctx: &mut ProcessingContext,
        _tx: &mut CompensatingTransaction,
    ) -> StageOutput {
        let bytes = ctx.shared_bytes();
        let result = self
            .executor
            .execute(&self.policy, Self::NAME, || {
                self.service.extract(&bytes, &self.request)
            })
            .await;

        match result {
            Ok(extraction) => {
                debug!(pages = ?extraction.page_count, "Extraction complete");
                match ctx.set_extraction(extraction) {
                    Ok(()) => StageOutput::ok(),
                    Err(err) => internal(Self::NAME, err.to_string()),
                }
            }
            Err(err) => StageOutput::from_retry(Self::NAME, &err),
        }
    }
}
