//! File-backed document store.

use super::{DocumentRecord, DocumentStore, RecordStatus};
use crate::core::Fingerprint;
use crate::errors::StoreError;
use crate::utils::now_utc;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Stores one JSON file per fingerprint in a directory.
///
/// Inserts write a temporary file and hard-link it to the final name. The
/// link fails with `AlreadyExists` when another writer got there first, which
/// gives the same atomic uniqueness a database constraint would.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    dir: PathBuf,
}

impl FileDocumentStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint.as_str()))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!(".tmp-{}.json", Uuid::new_v4()))
    }

    async fn write_temp(&self, record: &DocumentRecord) -> Result<PathBuf, StoreError> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, bytes).await?;
        Ok(tmp)
    }

    async fn remove_temp(tmp: &Path) {
        if let Err(err) = tokio::fs::remove_file(tmp).await {
            warn!(path = %tmp.display(), error = %err, "Failed to remove temporary record file");
        }
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        match tokio::fs::read(self.record_path(fingerprint)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn insert_if_absent(&self, record: DocumentRecord) -> Result<(), StoreError> {
        let tmp = self.write_temp(&record).await?;
        let target = self.record_path(&record.fingerprint);
        let linked = tokio::fs::hard_link(&tmp, &target).await;
        Self::remove_temp(&tmp).await;

        match linked {
            Ok(()) => {
                debug!(fingerprint = %record.fingerprint.short(), "Inserted record");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(StoreError::Conflict {
                fingerprint: record.fingerprint.as_str().to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn mark_status(
        &self,
        fingerprint: &Fingerprint,
        status: RecordStatus,
    ) -> Result<(), StoreError> {
        let mut record = self
            .find_by_fingerprint(fingerprint)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                fingerprint: fingerprint.as_str().to_string(),
            })?;
        record.status = status;
        record.updated_at = now_utc();

        let tmp = self.write_temp(&record).await?;
        if let Err(err) = tokio::fs::rename(&tmp, self.record_path(fingerprint)).await {
            Self::remove_temp(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RemoteResource, ResourceKind};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn record(bytes: &[u8]) -> DocumentRecord {
        DocumentRecord::new(Fingerprint::of(bytes), Uuid::now_v7()).with_resources(vec![
            RemoteResource::new(ResourceKind::UploadedFile, "file-1"),
        ])
    }

    #[tokio::test]
    async fn test_insert_find_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::open(dir.path().join("records")).await.unwrap();
        let rec = record(b"doc");

        store.insert_if_absent(rec.clone()).await.unwrap();
        let found = store.find_by_fingerprint(&rec.fingerprint).await.unwrap();
        assert_eq!(found, Some(rec));
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::open(dir.path()).await.unwrap();
        assert!(store
            .find_by_fingerprint(&Fingerprint::of(b"missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::open(dir.path()).await.unwrap();
        store.insert_if_absent(record(b"doc")).await.unwrap();

        let err = store.insert_if_absent(record(b"doc")).await.unwrap_err();
        assert!(err.is_conflict());

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].starts_with(".tmp-"));
    }

    #[tokio::test]
    async fn test_concurrent_inserts_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileDocumentStore::open(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_if_absent(record(b"race")).await
            }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_mark_status_rewrites_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::open(dir.path()).await.unwrap();
        let rec = record(b"doc");
        store.insert_if_absent(rec.clone()).await.unwrap();

        store
            .mark_status(&rec.fingerprint, RecordStatus::Completed)
            .await
            .unwrap();
        let found = store.find_by_fingerprint(&rec.fingerprint).await.unwrap().unwrap();
        assert_eq!(found.status, RecordStatus::Completed);
        assert_eq!(found.run_id, rec.run_id);

        let err = store
            .mark_status(&Fingerprint::of(b"other"), RecordStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
