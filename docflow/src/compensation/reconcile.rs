//! Out-of-band reconciliation from the audit trail.

use super::audit::AuditEntry;
use super::handlers::CleanupOutcome;
use crate::context::RemoteResource;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A remote resource whose cleanup failed and that may still exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedResource {
    /// The run that created the resource.
    pub run_id: Uuid,
    /// The resource.
    pub resource: RemoteResource,
    /// The last cleanup failure reason.
    pub reason: String,
}

/// Lists resources left behind by incomplete compensations.
///
/// A resource is reported once, with the most recent failure reason. A
/// resource that a later entry cleaned up successfully is not reported.
#[must_use]
pub fn orphaned_resources(entries: &[AuditEntry]) -> Vec<OrphanedResource> {
    let mut orphans: Vec<OrphanedResource> = Vec::new();
    let mut cleaned: HashSet<&RemoteResource> = HashSet::new();

    for entry in entries.iter().rev() {
        for record in entry.actions.iter().rev() {
            if cleaned.contains(&record.resource)
                || orphans.iter().any(|o| o.resource == record.resource)
            {
                continue;
            }
            match &record.outcome {
                CleanupOutcome::Failed { reason } => orphans.push(OrphanedResource {
                    run_id: entry.run_id,
                    resource: record.resource.clone(),
                    reason: reason.clone(),
                }),
                CleanupOutcome::Deleted | CleanupOutcome::AlreadyAbsent => {
                    cleaned.insert(&record.resource);
                }
            }
        }
    }

    orphans.reverse();
    orphans
}
