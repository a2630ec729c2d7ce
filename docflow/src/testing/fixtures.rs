//! Shared fixtures for pipeline tests.

use super::{
    CallJournal, FakeExtractionService, FakeIndexService, FakeUploadService, RecordingSleeper,
};
use crate::compensation::InMemoryAuditLog;
use crate::config::DocflowConfig;
use crate::errors::PipelineValidationError;
use crate::events::CollectingEventSink;
use crate::pipeline::{standard_pipeline, Pipeline, PipelineBuilder};
use crate::retry::RetryExecutor;
use crate::stages::ServicePorts;
use crate::storage::InMemoryDocumentStore;
use std::sync::Arc;

/// Returns a small valid PDF whose content varies with `seed`.
#[must_use]
pub fn sample_pdf(seed: u32) -> Vec<u8> {
    format!(
        "%PDF-1.7\n1 0 obj\n<< /Type /Catalog /Seed {seed} >>\nendobj\n\
         trailer\n<< /Root 1 0 R >>\n%%EOF\n"
    )
    .into_bytes()
}

/// Fakes, sinks and configuration behind a standard pipeline.
///
/// Every remote fake writes to the same [`CallJournal`], and retries go
/// through a [`RecordingSleeper`] so backoff never actually waits.
#[derive(Debug)]
pub struct TestHarness {
    /// Pipeline configuration.
    pub config: DocflowConfig,
    /// Journal of every remote call.
    pub journal: Arc<CallJournal>,
    /// Upload service fake.
    pub uploads: Arc<FakeUploadService>,
    /// Index service fake.
    pub index: Arc<FakeIndexService>,
    /// Extraction service fake.
    pub extraction: Arc<FakeExtractionService>,
    /// Durable store.
    pub store: Arc<InMemoryDocumentStore>,
    /// Audit log.
    pub audit: Arc<InMemoryAuditLog>,
    /// Lifecycle events.
    pub events: Arc<CollectingEventSink>,
    /// Recorded backoff waits.
    pub sleeper: Arc<RecordingSleeper>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Creates a harness with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DocflowConfig::default())
    }

    /// Creates a harness with `config`.
    #[must_use]
    pub fn with_config(config: DocflowConfig) -> Self {
        let journal = Arc::new(CallJournal::new());
        Self {
            config,
            uploads: Arc::new(FakeUploadService::new().with_journal(journal.clone())),
            index: Arc::new(FakeIndexService::new().with_journal(journal.clone())),
            extraction: Arc::new(FakeExtractionService::new(
                serde_json::json!({"title": "Quarterly report", "pages": 1}),
            )),
            journal,
            store: Arc::new(InMemoryDocumentStore::new()),
            audit: Arc::new(InMemoryAuditLog::new()),
            events: Arc::new(CollectingEventSink::new()),
            sleeper: Arc::new(RecordingSleeper::new()),
        }
    }

    /// Returns ports backed by the fakes.
    #[must_use]
    pub fn ports(&self) -> ServicePorts {
        ServicePorts::new(
            self.extraction.clone(),
            self.uploads.clone(),
            self.index.clone(),
            self.store.clone(),
        )
        .with_executor(RetryExecutor::with_sleeper(self.sleeper.clone()))
    }

    /// Returns a builder attached to the harness sinks.
    pub fn builder(&self, name: &str) -> PipelineBuilder {
        PipelineBuilder::new(name)
            .with_audit_sink(self.audit.clone())
            .with_event_sink(self.events.clone())
            .with_cleanup_timeout(self.config.cleanup_timeout())
    }

    /// Builds the standard pipeline attached to the harness sinks.
    pub fn pipeline(&self) -> Result<Pipeline, PipelineValidationError> {
        standard_pipeline(&self.config, &self.ports())?
            .with_audit_sink(self.audit.clone())
            .with_event_sink(self.events.clone())
            .build()
    }
}
