//! # Docflow
//!
//! A resilient pipeline for processing PDF documents against unreliable
//! remote services.
//!
//! Docflow runs each document through an ordered list of stages with
//! support for:
//!
//! - **Bounded retries**: remote calls go through a classified exponential
//!   backoff executor
//! - **Compensating transactions**: remote side effects are unwound in
//!   reverse order when a run cannot commit
//! - **Deduplication**: a content fingerprint backed by a unique durable
//!   store keeps one record per document
//! - **Audit trail**: every commit and compensation is recorded for
//!   reconciliation
//! - **Parallel batches**: a worker pool runs independent documents
//!   concurrently
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docflow::prelude::*;
//!
//! let config = DocflowConfig::load("docflow.json")?;
//! let store = open_store(&config).await?;
//! let ports = ServicePorts::new(extraction, uploads, index, store);
//! let pipeline = standard_pipeline(&config, &ports)?
//!     .with_audit_sink(open_audit_sink(&config)?)
//!     .build()?;
//!
//! let ctx = pipeline.run(bytes).await;
//! println!("{}", ctx.status());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod compensation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod remote;
pub mod retry;
pub mod stages;
pub mod storage;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::compensation::{
        orphaned_resources, AuditEntry, AuditSink, CleanupHandler, CompensatingTransaction,
        CompensationTrigger, InMemoryAuditLog, JsonlAuditLog,
    };
    pub use crate::config::{DocflowConfig, RetrySettings};
    pub use crate::context::{ProcessingContext, RemoteResource, ResourceKind};
    pub use crate::core::{
        ClassifiedError, DocumentStatus, ErrorKind, Fingerprint, StageKind, StageOutput,
        StageStatus,
    };
    pub use crate::errors::{
        DocflowError, PipelineValidationError, RemoteError, RemoteErrorKind, RetryError,
        StoreError,
    };
    pub use crate::events::{Event, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        open_audit_sink, open_store, standard_pipeline, Pipeline, PipelineBuilder, WorkerPool,
    };
    pub use crate::remote::{ExtractionService, IndexService, UploadService};
    pub use crate::retry::{RetryExecutor, RetryPolicy};
    pub use crate::stages::{ServicePorts, Stage};
    pub use crate::storage::{DocumentRecord, DocumentStore};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
