//! JSON payloads attached to pipeline events.

use crate::context::{ProcessingContext, StageRecord};
use crate::core::StageOutput;
use crate::utils::{format_iso8601, now_utc};
use std::collections::BTreeMap;

/// Builds the payload for a finished stage.
#[must_use]
pub fn stage_payload(
    ctx: &ProcessingContext,
    record: &StageRecord,
    output: &StageOutput,
) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "run_id": ctx.run_id().to_string(),
        "stage": record.stage,
        "kind": record.kind.to_string(),
        "status": record.status.to_string(),
        "started_at": format_iso8601(&record.started_at),
        "ended_at": format_iso8601(&record.ended_at),
        "duration_ms": record.duration_ms(),
    });

    match output {
        StageOutput::Skip { reason } => {
            payload["reason"] = serde_json::json!(reason);
        }
        StageOutput::Invalid(err) | StageOutput::Fatal(err) => {
            payload["error"] = serde_json::json!({
                "kind": err.kind.to_string(),
                "message": err.message,
                "attempts": err.attempts,
            });
        }
        StageOutput::Continue => {}
    }
    payload
}

/// Builds the summary payload for a document run.
///
/// Called once the context has reached a terminal status.
#[must_use]
pub fn document_payload(ctx: &ProcessingContext) -> serde_json::Value {
    let mut stage_counts: BTreeMap<String, u32> = BTreeMap::new();
    for record in ctx.stage_records() {
        *stage_counts.entry(record.status.to_string()).or_insert(0) += 1;
    }
    let ended_at = ctx.finished_at().unwrap_or_else(now_utc);

    serde_json::json!({
        "run_id": ctx.run_id().to_string(),
        "fingerprint": ctx.fingerprint().map(|fp| fp.as_str().to_string()),
        "status": ctx.status().to_string(),
        "is_duplicate": ctx.is_duplicate(),
        "bytes": ctx.raw_bytes().len(),
        "resources": ctx
            .retained_resource_ids()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        "stage_counts": stage_counts,
        "errors": ctx
            .errors()
            .iter()
            .map(|e| e.kind.to_string())
            .collect::<Vec<_>>(),
        "duration_ms": (ended_at - ctx.created_at()).num_milliseconds(),
    })
}
