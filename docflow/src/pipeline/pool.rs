//! Bounded parallel processing of independent documents.

use super::engine::panic_message;
use super::Pipeline;
use crate::cancellation::CancellationToken;
use crate::context::ProcessingContext;
use crate::core::{ClassifiedError, DocumentStatus, ErrorKind};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Runs many documents through one pipeline with a fixed concurrency limit.
///
/// Documents never share state except through the durable store. Results
/// come back in submission order.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    pipeline: Arc<Pipeline>,
    workers: usize,
    token: Arc<CancellationToken>,
}

impl WorkerPool {
    /// Creates a pool running at most `workers` documents at a time.
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>, workers: usize) -> Self {
        Self {
            pipeline,
            workers: workers.max(1),
            token: Arc::new(CancellationToken::new()),
        }
    }

    /// Shares `token` with every run.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.token = token;
        self
    }

    /// Returns the concurrency limit.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Processes every document and returns one terminal context per input.
    ///
    /// A run that panics yields a `failed` context carrying an `Internal`
    /// error.
    pub async fn process_all<I, B>(&self, documents: I) -> Vec<ProcessingContext>
    where
        I: IntoIterator<Item = B>,
        B: Into<Arc<[u8]>>,
    {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut inputs: Vec<Arc<[u8]>> = Vec::new();
        let mut set = JoinSet::new();

        for (index, bytes) in documents.into_iter().enumerate() {
            let bytes: Arc<[u8]> = bytes.into();
            inputs.push(Arc::clone(&bytes));
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            let token = Arc::clone(&self.token);

            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let run = pipeline.run_with_cancellation(Arc::clone(&bytes), &token);
                let run = AssertUnwindSafe(run).catch_unwind().await;
                let ctx = match run {
                    Ok(ctx) => ctx,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(index, panic = %message, "Document run panicked");
                        failed_context(bytes, format!("run panicked: {message}"))
                    }
                };
                (index, ctx)
            });
        }

        info!(documents = inputs.len(), workers = self.workers, "Processing batch");

        let mut results: Vec<Option<ProcessingContext>> = inputs.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, ctx)) => {
                    if let Some(slot) = results.get_mut(index) {
                        *slot = Some(ctx);
                    }
                }
                Err(err) => error!(error = %err, "Worker task did not complete"),
            }
        }

        results
            .into_iter()
            .zip(inputs)
            .map(|(result, bytes)| {
                result.unwrap_or_else(|| {
                    failed_context(bytes, "worker task did not complete".to_string())
                })
            })
            .collect()
    }
}

fn failed_context(bytes: Arc<[u8]>, message: String) -> ProcessingContext {
    let mut ctx = ProcessingContext::new(bytes);
    ctx.record_error(ClassifiedError::new(ErrorKind::Internal, "worker", message));
    if let Err(err) = ctx.finish(DocumentStatus::Failed) {
        error!(error = %err, "Could not fail context");
    }
    ctx
}
