//! Testing utilities for docflow pipelines.
//!
//! This module provides:
//! - In-memory fakes for the remote services
//! - Mock stages
//! - Assertions over finished runs
//! - A harness wiring the standard pipeline to the fakes

mod assertions;
mod fakes;
mod fixtures;
mod mocks;

pub use assertions::{assert_error_kinds, assert_no_orphans, assert_status};
pub use fakes::{
    CallJournal, FakeExtractionService, FakeIndexService, FakeUploadService, RecordingSleeper,
};
pub use fixtures::{sample_pdf, TestHarness};
pub use mocks::{BarrierStage, PanickingStage, ResourceStage, ScriptedStage};
