//! Collaborators injected into the standard stages.

use crate::remote::{ExtractionService, IndexService, UploadService};
use crate::retry::RetryExecutor;
use crate::storage::DocumentStore;
use std::sync::Arc;

/// Remote services, the durable store and the retry executor shared by the
/// standard stages.
#[derive(Clone)]
pub struct ServicePorts {
    /// Structured extraction service.
    pub extraction: Arc<dyn ExtractionService>,
    /// Content-addressable upload service.
    pub uploads: Arc<dyn UploadService>,
    /// Semantic index service.
    pub index: Arc<dyn IndexService>,
    /// Durable document store.
    pub store: Arc<dyn DocumentStore>,
    /// Executor wrapping every remote call.
    pub executor: RetryExecutor,
}

impl std::fmt::Debug for ServicePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePorts")
            .field("extraction", &self.extraction)
            .field("uploads", &self.uploads)
            .field("index", &self.index)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ServicePorts {
    /// Creates ports with a tokio-backed retry executor.
    #[must_use]
    pub fn new(
        extraction: Arc<dyn ExtractionService>,
        uploads: Arc<dyn UploadService>,
        index: Arc<dyn IndexService>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            extraction,
            uploads,
            index,
            store,
            executor: RetryExecutor::new(),
        }
    }

    /// Replaces the retry executor.
    #[must_use]
    pub fn with_executor(mut self, executor: RetryExecutor) -> Self {
        self.executor = executor;
        self
    }
}
