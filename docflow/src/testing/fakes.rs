//! In-memory fakes for the remote collaborators.

use crate::errors::RemoteError;
use crate::remote::{
    DeleteResult, Extraction, ExtractionRequest, ExtractionService, IndexRequest, IndexService,
    UploadRequest, UploadService,
};
use crate::retry::Sleeper;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Ordered log of remote calls shared between fakes.
#[derive(Debug, Default)]
pub struct CallJournal {
    entries: Mutex<Vec<String>>,
}

impl CallJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns every entry in call order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Returns the entries starting with `prefix`.
    #[must_use]
    pub fn entries_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// Resource bookkeeping shared by the upload and index fakes.
#[derive(Debug)]
struct FakeResources {
    kind: &'static str,
    prefix: &'static str,
    live: Mutex<Vec<String>>,
    next_id: AtomicU64,
    create_failures: Mutex<VecDeque<RemoteError>>,
    delete_failure: Mutex<Option<RemoteError>>,
    create_calls: AtomicU32,
    delete_calls: AtomicU32,
    journal: Option<Arc<CallJournal>>,
}

impl FakeResources {
    fn new(kind: &'static str, prefix: &'static str) -> Self {
        Self {
            kind,
            prefix,
            live: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            create_failures: Mutex::new(VecDeque::new()),
            delete_failure: Mutex::new(None),
            create_calls: AtomicU32::new(0),
            delete_calls: AtomicU32::new(0),
            journal: None,
        }
    }

    fn create(&self, verb: &str) -> Result<String, RemoteError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.create_failures.lock().pop_front() {
            return Err(err);
        }
        let id = format!("{}-{}", self.prefix, self.next_id.fetch_add(1, Ordering::SeqCst));
        self.live.lock().push(id.clone());
        if let Some(journal) = &self.journal {
            journal.record(format!("{verb} {}:{id}", self.kind));
        }
        Ok(id)
    }

    fn delete(&self, id: &str) -> Result<DeleteResult, RemoteError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.delete_failure.lock().clone() {
            return Err(err);
        }
        if let Some(journal) = &self.journal {
            journal.record(format!("delete {}:{id}", self.kind));
        }
        let mut live = self.live.lock();
        match live.iter().position(|l| l == id) {
            Some(pos) => {
                live.remove(pos);
                Ok(DeleteResult::Deleted)
            }
            None => Ok(DeleteResult::NotFound),
        }
    }
}

/// Upload service that keeps file ids in memory.
///
/// Every upload returns a fresh id, even for identical bytes.
#[derive(Debug)]
pub struct FakeUploadService {
    inner: FakeResources,
}

impl Default for FakeUploadService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeUploadService {
    /// Creates an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: FakeResources::new("uploaded-file", "file"),
        }
    }

    /// Records uploads and deletes in `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<CallJournal>) -> Self {
        self.inner.journal = Some(journal);
        self
    }

    /// Fails the next upload with `err`. Calls queue up.
    pub fn fail_next_upload(&self, err: RemoteError) {
        self.inner.create_failures.lock().push_back(err);
    }

    /// Fails every delete with `err` until cleared.
    pub fn fail_deletes_with(&self, err: RemoteError) {
        *self.inner.delete_failure.lock() = Some(err);
    }

    /// Lets deletes succeed again.
    pub fn clear_delete_failure(&self) {
        *self.inner.delete_failure.lock() = None;
    }

    /// Adds a live file without going through `upload`.
    pub fn seed(&self, id: impl Into<String>) {
        self.inner.live.lock().push(id.into());
    }

    /// Returns the ids that currently exist.
    #[must_use]
    pub fn live_ids(&self) -> Vec<String> {
        self.inner.live.lock().clone()
    }

    /// Returns the number of upload calls.
    #[must_use]
    pub fn upload_calls(&self) -> u32 {
        self.inner.create_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of delete calls.
    #[must_use]
    pub fn delete_calls(&self) -> u32 {
        self.inner.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UploadService for FakeUploadService {
    async fn upload(&self, _bytes: &[u8], _request: &UploadRequest) -> Result<String, RemoteError> {
        self.inner.create("upload")
    }

    async fn delete(&self, file_id: &str) -> Result<DeleteResult, RemoteError> {
        self.inner.delete(file_id)
    }
}

/// Index service that keeps entries in memory.
#[derive(Debug)]
pub struct FakeIndexService {
    inner: FakeResources,
    requests: Mutex<Vec<IndexRequest>>,
}

impl Default for FakeIndexService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeIndexService {
    /// Creates an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: FakeResources::new("index-entry", "entry"),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Records registrations and deletes in `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<CallJournal>) -> Self {
        self.inner.journal = Some(journal);
        self
    }

    /// Fails the next registration with `err`. Calls queue up.
    pub fn fail_next_register(&self, err: RemoteError) {
        self.inner.create_failures.lock().push_back(err);
    }

    /// Fails every delete with `err` until cleared.
    pub fn fail_deletes_with(&self, err: RemoteError) {
        *self.inner.delete_failure.lock() = Some(err);
    }

    /// Lets deletes succeed again.
    pub fn clear_delete_failure(&self) {
        *self.inner.delete_failure.lock() = None;
    }

    /// Adds a live entry without going through `register`.
    pub fn seed(&self, id: impl Into<String>) {
        self.inner.live.lock().push(id.into());
    }

    /// Returns the ids that currently exist.
    #[must_use]
    pub fn live_ids(&self) -> Vec<String> {
        self.inner.live.lock().clone()
    }

    /// Returns every successful registration request.
    #[must_use]
    pub fn requests(&self) -> Vec<IndexRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of register calls.
    #[must_use]
    pub fn register_calls(&self) -> u32 {
        self.inner.create_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of delete calls.
    #[must_use]
    pub fn delete_calls(&self) -> u32 {
        self.inner.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexService for FakeIndexService {
    async fn register(&self, request: &IndexRequest) -> Result<String, RemoteError> {
        let id = self.inner.create("register")?;
        self.requests.lock().push(request.clone());
        Ok(id)
    }

    async fn delete(&self, entry_id: &str) -> Result<DeleteResult, RemoteError> {
        self.inner.delete(entry_id)
    }
}

/// Extraction service returning a fixed payload.
#[derive(Debug)]
pub struct FakeExtractionService {
    payload: serde_json::Value,
    failures: Mutex<VecDeque<RemoteError>>,
    calls: AtomicU32,
}

impl FakeExtractionService {
    /// Creates a fake that returns `payload`.
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Fails the next call with `err`. Calls queue up.
    pub fn fail_next(&self, err: RemoteError) {
        self.failures.lock().push_back(err);
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionService for FakeExtractionService {
    async fn extract(
        &self,
        _bytes: &[u8],
        request: &ExtractionRequest,
    ) -> Result<Extraction, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        let mut extraction = Extraction::new(self.payload.clone());
        extraction.model.clone_from(&request.model);
        extraction.page_count = Some(1);
        Ok(extraction)
    }
}

/// Sleeper that records requested waits and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every requested wait in order.
    #[must_use]
    pub fn recorded(&self) -> Vec<Duration> {
        self.waits.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().push(duration);
        tokio::task::yield_now().await;
    }
}
