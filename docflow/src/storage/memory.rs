//! In-memory document store.

use super::{DocumentRecord, DocumentStore, RecordStatus};
use crate::core::Fingerprint;
use crate::errors::StoreError;
use crate::utils::now_utc;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Document store backed by a `DashMap`.
///
/// `insert_if_absent` goes through the map's entry API, which holds the
/// shard lock for the check and the insert.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    records: DashMap<String, DocumentRecord>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the record for `fingerprint`.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<DocumentRecord> {
        self.records.get(fingerprint.as_str()).map(|r| r.value().clone())
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.get(fingerprint))
    }

    async fn insert_if_absent(&self, record: DocumentRecord) -> Result<(), StoreError> {
        match self.records.entry(record.fingerprint.as_str().to_string()) {
            Entry::Occupied(_) => Err(StoreError::Conflict {
                fingerprint: record.fingerprint.as_str().to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn mark_status(
        &self,
        fingerprint: &Fingerprint,
        status: RecordStatus,
    ) -> Result<(), StoreError> {
        let mut record =
            self.records
                .get_mut(fingerprint.as_str())
                .ok_or_else(|| StoreError::NotFound {
                    fingerprint: fingerprint.as_str().to_string(),
                })?;
        record.status = status;
        record.updated_at = now_utc();
        Ok(())
    }
}
