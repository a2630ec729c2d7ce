//! Per-document processing context.
//!
//! This module provides:
//! - `ProcessingContext`, owned by exactly one pipeline run
//! - Remote resource identifiers tracked during a run
//! - Per-stage timing records

mod processing;
mod resource;

pub use processing::{ProcessingContext, StageRecord};
pub use resource::{RemoteResource, ResourceKind};
