//! Core types shared by every pipeline component.
//!
//! This module contains:
//! - Document and stage status enums
//! - `StageOutput` and the classified error taxonomy
//! - Content fingerprints

mod classified;
mod fingerprint;
mod output;
mod status;

pub use classified::{ClassifiedError, ErrorKind};
pub use fingerprint::Fingerprint;
pub use output::StageOutput;
pub use status::{DocumentStatus, StageKind, StageStatus};
