//! Destinations for pipeline events.

use super::{Event, PipelineEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Receives pipeline lifecycle events.
///
/// Emitting never fails the run; sinks handle their own errors.
#[async_trait]
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Delivers one event.
    async fn emit(&self, event: Event);
}

/// Discards every event. The builder's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: Event) {}
}

/// Writes events to `tracing`.
///
/// Stage events are logged at `debug`; document and compensation events at
/// `info`, so a default filter shows one line per run plus every unwind.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink {
    verbose: bool,
}

impl LoggingEventSink {
    /// Creates a sink that logs stage events at `debug`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs stage events at `info` as well.
    #[must_use]
    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: Event) {
        let stage = event.stage.as_deref().unwrap_or("-");
        if event.kind.is_stage_event() && !self.verbose {
            debug!(
                event = %event.kind,
                run_id = %event.run_id,
                stage,
                payload = %event.payload,
                "Pipeline event"
            );
        } else {
            info!(
                event = %event.kind,
                run_id = %event.run_id,
                stage,
                payload = %event.payload,
                "Pipeline event"
            );
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Returns the event kinds in emission order.
    #[must_use]
    pub fn kinds(&self) -> Vec<PipelineEvent> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    /// Returns the events of `kind`.
    #[must_use]
    pub fn of_kind(&self, kind: PipelineEvent) -> Vec<Event> {
        self.filtered(|e| e.kind == kind)
    }

    /// Returns the events of one run.
    #[must_use]
    pub fn for_run(&self, run_id: Uuid) -> Vec<Event> {
        self.filtered(|e| e.run_id == run_id)
    }

    /// Returns the kinds of events about `stage` in one run.
    #[must_use]
    pub fn stage_history(&self, run_id: Uuid, stage: &str) -> Vec<PipelineEvent> {
        self.filtered(|e| e.run_id == run_id && e.stage.as_deref() == Some(stage))
            .into_iter()
            .map(|e| e.kind)
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    fn filtered(&self, keep: impl Fn(&Event) -> bool) -> Vec<Event> {
        self.events.lock().iter().filter(|e| keep(e)).cloned().collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn started(run_id: Uuid, stage: &str) -> Event {
        Event::stage(PipelineEvent::StageStarted, run_id, stage, json!({}))
    }

    #[tokio::test]
    async fn test_noop_and_logging_sinks_accept_events() {
        let run_id = Uuid::now_v7();
        NoOpEventSink.emit(started(run_id, "upload")).await;
        LoggingEventSink::new().emit(started(run_id, "upload")).await;
        LoggingEventSink::verbose()
            .emit(Event::document(PipelineEvent::DocumentStarted, run_id, json!({"bytes": 3})))
            .await;
    }

    #[tokio::test]
    async fn test_collecting_sink_filters_by_run_and_stage() {
        let sink = CollectingEventSink::new();
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();

        sink.emit(Event::document(PipelineEvent::DocumentStarted, first, json!({})))
            .await;
        sink.emit(started(first, "upload")).await;
        sink.emit(started(second, "upload")).await;
        sink.emit(Event::stage(PipelineEvent::StageFailed, first, "upload", json!({})))
            .await;

        assert_eq!(sink.len(), 4);
        assert_eq!(sink.for_run(first).len(), 3);
        assert_eq!(sink.of_kind(PipelineEvent::StageStarted).len(), 2);
        assert_eq!(
            sink.stage_history(first, "upload"),
            vec![PipelineEvent::StageStarted, PipelineEvent::StageFailed]
        );
        assert!(sink.stage_history(second, "index").is_empty());
    }
}
