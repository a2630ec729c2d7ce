//! Durable document storage.
//!
//! The store's uniqueness constraint on the fingerprint is the only
//! synchronization point between concurrent runs. Two runs that both pass
//! the dedup check race at [`DocumentStore::insert_if_absent`]; exactly one
//! wins and the other receives [`StoreError::Conflict`].

mod file;
mod memory;

pub use file::FileDocumentStore;
pub use memory::InMemoryDocumentStore;

use crate::context::RemoteResource;
use crate::core::Fingerprint;
use crate::errors::StoreError;
use crate::utils::{now_utc, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use uuid::Uuid;

/// Lifecycle of a durable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Inserted by a commit, not yet finalized.
    #[default]
    Pending,
    /// The run that inserted the record completed.
    Completed,
    /// The record was written but post-commit work failed.
    Failed,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A processed document as persisted by the commit stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique content fingerprint.
    pub fingerprint: Fingerprint,
    /// The run that created the record.
    pub run_id: Uuid,
    /// Record status.
    pub status: RecordStatus,
    /// Remote resources the record owns.
    #[serde(default)]
    pub resources: Vec<RemoteResource>,
    /// Structured extraction result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<serde_json::Value>,
    /// When the record was inserted.
    pub created_at: Timestamp,
    /// When the record was last changed.
    pub updated_at: Timestamp,
}

impl DocumentRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn new(fingerprint: Fingerprint, run_id: Uuid) -> Self {
        let now = now_utc();
        Self {
            fingerprint,
            run_id,
            status: RecordStatus::Pending,
            resources: Vec::new(),
            extraction: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the owned resources.
    #[must_use]
    pub fn with_resources(mut self, resources: Vec<RemoteResource>) -> Self {
        self.resources = resources;
        self
    }

    /// Sets the extraction payload.
    #[must_use]
    pub fn with_extraction(mut self, extraction: serde_json::Value) -> Self {
        self.extraction = Some(extraction);
        self
    }
}

/// Durable storage for processed documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Looks up a record by fingerprint.
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<DocumentRecord>, StoreError>;

    /// Inserts a record unless one with the same fingerprint exists.
    ///
    /// Returns [`StoreError::Conflict`] when the fingerprint is taken.
    async fn insert_if_absent(&self, record: DocumentRecord) -> Result<(), StoreError>;

    /// Updates the status of an existing record.
    async fn mark_status(
        &self,
        fingerprint: &Fingerprint,
        status: RecordStatus,
    ) -> Result<(), StoreError>;
}
