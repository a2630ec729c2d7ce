//! Idempotent undo actions for remote resources.

use crate::errors::RemoteErrorKind;
use crate::remote::{DeleteResult, IndexService, UploadService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::warn;

/// Result of a single cleanup action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// The resource was deleted.
    Deleted,
    /// The resource did not exist. Counts as success.
    AlreadyAbsent,
    /// The resource could not be deleted.
    Failed {
        /// Why the cleanup failed.
        reason: String,
    },
}

impl CleanupOutcome {
    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Returns true if the resource is known to be gone.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Deleted | Self::AlreadyAbsent)
    }
}

/// Undo action for one kind of remote resource.
///
/// Implementations must be idempotent: cleaning up a resource that no
/// longer exists returns [`CleanupOutcome::AlreadyAbsent`].
#[async_trait]
pub trait CleanupHandler: Send + Sync + Debug {
    /// Returns the handler name used in audit entries.
    fn name(&self) -> &str;

    /// Deletes the resource identified by `resource_id`.
    async fn cleanup(&self, resource_id: &str) -> CleanupOutcome;
}

fn outcome_of(
    handler: &str,
    resource_id: &str,
    result: Result<DeleteResult, crate::errors::RemoteError>,
) -> CleanupOutcome {
    match result {
        Ok(DeleteResult::Deleted) => CleanupOutcome::Deleted,
        Ok(DeleteResult::NotFound) => CleanupOutcome::AlreadyAbsent,
        Err(err) if err.kind == RemoteErrorKind::NotFound => CleanupOutcome::AlreadyAbsent,
        Err(err) => {
            warn!(handler, resource_id, error = %err, "Cleanup failed");
            CleanupOutcome::failed(err.to_string())
        }
    }
}

/// Deletes an uploaded file by id.
#[derive(Debug, Clone)]
pub struct DeleteUploadedFile {
    service: Arc<dyn UploadService>,
}

impl DeleteUploadedFile {
    /// Creates the handler.
    #[must_use]
    pub fn new(service: Arc<dyn UploadService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl CleanupHandler for DeleteUploadedFile {
    fn name(&self) -> &str {
        "delete_uploaded_file"
    }

    async fn cleanup(&self, resource_id: &str) -> CleanupOutcome {
        outcome_of(self.name(), resource_id, self.service.delete(resource_id).await)
    }
}

/// Deletes an index entry by id.
#[derive(Debug, Clone)]
pub struct DeleteIndexEntry {
    service: Arc<dyn IndexService>,
}

impl DeleteIndexEntry {
    /// Creates the handler.
    #[must_use]
    pub fn new(service: Arc<dyn IndexService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl CleanupHandler for DeleteIndexEntry {
    fn name(&self) -> &str {
        "delete_index_entry"
    }

    async fn cleanup(&self, resource_id: &str) -> CleanupOutcome {
        outcome_of(self.name(), resource_id, self.service.delete(resource_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fingerprint;
    use crate::errors::RemoteError;
    use crate::remote::UploadRequest;
    use crate::testing::{FakeIndexService, FakeUploadService};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_delete_uploaded_file_is_idempotent() {
        let uploads = Arc::new(FakeUploadService::new());
        let id = uploads
            .upload(b"%PDF-1.4", &UploadRequest::new(Fingerprint::of(b"%PDF-1.4")))
            .await
            .unwrap();

        let handler = DeleteUploadedFile::new(uploads.clone());
        assert_eq!(handler.cleanup(&id).await, CleanupOutcome::Deleted);
        assert_eq!(handler.cleanup(&id).await, CleanupOutcome::AlreadyAbsent);
        assert!(uploads.live_ids().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_error_is_already_absent() {
        let index = Arc::new(FakeIndexService::new());
        index.fail_deletes_with(RemoteError::from_status(404, "gone"));

        let handler = DeleteIndexEntry::new(index);
        assert_eq!(handler.cleanup("entry-9").await, CleanupOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_other_errors_fail() {
        let index = Arc::new(FakeIndexService::new());
        index.fail_deletes_with(RemoteError::server("unavailable"));

        let handler = DeleteIndexEntry::new(index.clone());
        let outcome = handler.cleanup("entry-1").await;
        assert!(!outcome.is_success());
        assert!(matches!(outcome, CleanupOutcome::Failed { .. }));
        assert_eq!(index.delete_calls(), 1);
    }

    #[test]
    fn test_outcome_serde() {
        let json = serde_json::to_value(CleanupOutcome::failed("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"result": "failed", "reason": "boom"}));
        let json = serde_json::to_value(CleanupOutcome::AlreadyAbsent).unwrap();
        assert_eq!(json, serde_json::json!({"result": "already_absent"}));
    }
}
