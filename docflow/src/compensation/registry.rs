//! LIFO registry of pending cleanup actions.

use super::audit::CleanupRecord;
use super::handlers::{CleanupHandler, CleanupOutcome};
use crate::context::RemoteResource;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error};

/// Default bound on a single cleanup action.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// A cleanup handler bound to the resource it undoes.
#[derive(Debug, Clone)]
pub struct CleanupAction {
    resource: RemoteResource,
    handler: Arc<dyn CleanupHandler>,
}

impl CleanupAction {
    pub(crate) fn new(resource: RemoteResource, handler: Arc<dyn CleanupHandler>) -> Self {
        Self { resource, handler }
    }

    /// Returns the resource this action undoes.
    #[must_use]
    pub fn resource(&self) -> &RemoteResource {
        &self.resource
    }

    /// Returns the handler name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.handler.name()
    }

    async fn run(self, limit: Duration) -> CleanupRecord {
        let started = Instant::now();
        let name = self.handler.name().to_string();
        let fut = AssertUnwindSafe(self.handler.cleanup(&self.resource.id)).catch_unwind();

        let outcome = match timeout(limit, fut).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                error!(handler = %name, resource = %self.resource, "Cleanup action panicked");
                CleanupOutcome::failed("cleanup action panicked")
            }
            Err(_) => {
                error!(
                    handler = %name,
                    resource = %self.resource,
                    timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    "Cleanup action timed out"
                );
                CleanupOutcome::failed(format!("timed out after {}ms", limit.as_millis()))
            }
        };

        CleanupRecord {
            action: name,
            resource: self.resource,
            outcome,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Pending cleanup actions for one unit of work.
///
/// Actions run in LIFO order (last registered, first executed) so that
/// resources are released in the reverse of their creation order.
#[derive(Debug)]
pub struct CleanupRegistry {
    actions: Vec<CleanupAction>,
    action_timeout: Duration,
}

impl Default for CleanupRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ACTION_TIMEOUT)
    }
}

impl CleanupRegistry {
    /// Creates an empty registry with a per-action timeout.
    #[must_use]
    pub fn new(action_timeout: Duration) -> Self {
        Self {
            actions: Vec::new(),
            action_timeout,
        }
    }

    /// Returns the per-action timeout.
    #[must_use]
    pub fn action_timeout(&self) -> Duration {
        self.action_timeout
    }

    pub(crate) fn push(&mut self, action: CleanupAction) {
        debug!(handler = action.name(), resource = %action.resource, "Registered cleanup action");
        self.actions.push(action);
    }

    /// Returns the number of pending actions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns true if no actions are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the resources of the pending actions, in registration order.
    #[must_use]
    pub fn pending_resources(&self) -> Vec<RemoteResource> {
        self.actions.iter().map(|a| a.resource.clone()).collect()
    }

    /// Drops every pending action without running it.
    pub(crate) fn discard(&mut self) -> Vec<CleanupAction> {
        std::mem::take(&mut self.actions)
    }

    /// Runs every pending action in LIFO order and empties the registry.
    ///
    /// Failures, timeouts and panics are recorded and never stop the
    /// remaining actions.
    pub async fn run_all(&mut self) -> Vec<CleanupRecord> {
        let actions = self.discard();
        run_actions(actions, self.action_timeout).await
    }
}

/// Runs `actions` in reverse registration order.
pub(crate) async fn run_actions(
    actions: Vec<CleanupAction>,
    limit: Duration,
) -> Vec<CleanupRecord> {
    let mut records = Vec::with_capacity(actions.len());
    for action in actions.into_iter().rev() {
        records.push(action.run(limit).await);
    }
    records
}
