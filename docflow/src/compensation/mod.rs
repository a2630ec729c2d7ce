//! Compensating transactions for remote side effects.
//!
//! This module provides:
//! - `CompensatingTransaction`, the scoped unit of work stages register
//!   remote resources with
//! - `CleanupHandler` implementations that delete remote resources by id
//! - `CleanupRegistry`, run in LIFO order with per-action timeouts
//! - The append-only audit trail and reconciliation helpers

mod audit;
mod handlers;
pub mod reconcile;
mod registry;
mod transaction;

pub use audit::{
    AuditEntry, AuditOutcome, AuditSink, CleanupRecord, CompensationTrigger, InMemoryAuditLog,
    JsonlAuditLog,
};
pub use handlers::{CleanupHandler, CleanupOutcome, DeleteIndexEntry, DeleteUploadedFile};
pub use reconcile::{orphaned_resources, OrphanedResource};
pub use registry::{CleanupAction, CleanupRegistry, DEFAULT_ACTION_TIMEOUT};
pub use transaction::{CommitOutcome, CompensatingTransaction, CompensationReport};
