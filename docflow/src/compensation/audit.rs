//! Append-only audit trail of commits and compensations.

use super::handlers::CleanupOutcome;
use crate::context::RemoteResource;
use crate::errors::AuditError;
use crate::utils::Timestamp;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Whether the unit of work ended in a durable commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The durable write succeeded; resources are authoritative.
    Success,
    /// The unit of work was rolled back.
    Failure,
}

/// What caused compensation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationTrigger {
    /// The durable write failed.
    CommitFailed,
    /// The durable write hit a uniqueness conflict.
    DurableConflict,
    /// A stage returned a fatal error.
    StageFailed,
    /// A stage rejected the input.
    InvalidInput,
    /// A stage short-circuited the run.
    ShortCircuit,
    /// The run was cancelled.
    Cancelled,
    /// A stage created resources without declaring it.
    UndeclaredSideEffect,
    /// The pipeline finished with no commit.
    NoCommit,
    /// The transaction was dropped with pending actions.
    ScopeDropped,
}

/// Outcome of one cleanup action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupRecord {
    /// Handler name.
    pub action: String,
    /// The resource the action targeted.
    pub resource: RemoteResource,
    /// What happened.
    pub outcome: CleanupOutcome,
    /// How long the action took.
    pub duration_ms: u64,
}

/// One immutable audit record per commit or compensation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// The run the unit of work belonged to.
    pub run_id: Uuid,
    /// Document fingerprint, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// The stage that committed or aborted.
    pub stage: String,
    /// When the unit of work started.
    pub started_at: Timestamp,
    /// When the commit or compensation finished.
    pub ended_at: Timestamp,
    /// Commit or rollback.
    pub outcome: AuditOutcome,
    /// What caused compensation, if it ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<CompensationTrigger>,
    /// Whether cleanup actions ran.
    pub compensation_ran: bool,
    /// Resources created in the unit of work.
    #[serde(default)]
    pub resources: Vec<RemoteResource>,
    /// Per-action cleanup results, in execution order.
    #[serde(default)]
    pub actions: Vec<CleanupRecord>,
    /// True when at least one cleanup failed and an operator must step in.
    pub requires_remediation: bool,
}

impl AuditEntry {
    /// Returns the cleanup records that failed.
    pub fn failed_actions(&self) -> impl Iterator<Item = &CleanupRecord> {
        self.actions.iter().filter(|r| !r.outcome.is_success())
    }
}

/// Destination for audit entries.
///
/// Sinks are write-only from the pipeline's point of view; entries are never
/// read back for control flow.
///
/// `append` is synchronous. It is called on the run's own task, once per
/// commit or compensation, and from `Drop` where nothing can be awaited.
pub trait AuditSink: Send + Sync + Debug {
    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be persisted.
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Audit log kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every entry.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries.write().push(entry.clone());
        Ok(())
    }
}

/// Audit log written as JSON lines.
///
/// Each `append` serializes outside the lock, then performs a blocking
/// `write_all` and `flush` on the calling thread while holding it. With a
/// tokio runtime that thread is a worker, so the log belongs on a local
/// disk; an entry is on disk (modulo the OS cache) before the run moves on.
#[derive(Debug)]
pub struct JsonlAuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditLog {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the log path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every entry from a JSONL audit file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a line is malformed.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>, AuditError> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}

impl AuditSink for JsonlAuditLog {
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}
