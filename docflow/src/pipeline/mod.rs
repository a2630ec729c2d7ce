//! Pipeline building and execution.
//!
//! This module provides:
//! - `PipelineBuilder` with build-time validation
//! - The sequential per-document engine
//! - A bounded worker pool for batches of documents
//! - The standard validate-to-persist wiring

mod builder;
mod engine;
mod pool;
mod standard;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use engine::Pipeline;
pub use pool::WorkerPool;
pub use standard::{open_audit_sink, open_store, standard_pipeline};
