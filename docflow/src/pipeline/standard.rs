//! The standard document pipeline and its backing sinks.

use super::PipelineBuilder;
use crate::compensation::{AuditSink, InMemoryAuditLog, JsonlAuditLog};
use crate::config::DocflowConfig;
use crate::errors::{AuditError, PipelineValidationError, StoreError};
use crate::stages::{
    ExtractStage, FingerprintStage, IndexStage, PersistStage, ServicePorts, UploadStage,
    ValidateStage,
};
use crate::storage::{DocumentStore, FileDocumentStore, InMemoryDocumentStore};
use std::sync::Arc;

/// Wires validate, fingerprint, extract, upload, index and persist.
///
/// The returned builder already carries the cleanup timeout from `config`;
/// attach sinks before calling `build`.
pub fn standard_pipeline(
    config: &DocflowConfig,
    ports: &ServicePorts,
) -> Result<PipelineBuilder, PipelineValidationError> {
    PipelineBuilder::new(config.pipeline_name.clone())
        .with_cleanup_timeout(config.cleanup_timeout())
        .stage(Arc::new(ValidateStage::new(
            config.max_document_bytes,
            config.require_pdf_header,
        )))?
        .stage(Arc::new(FingerprintStage::new(Arc::clone(&ports.store))))?
        .stage(Arc::new(ExtractStage::new(
            Arc::clone(&ports.extraction),
            ports.executor.clone(),
            config.extraction_policy(),
        )))?
        .stage(Arc::new(UploadStage::new(
            Arc::clone(&ports.uploads),
            ports.executor.clone(),
            config.upload_policy(),
        )))?
        .stage(Arc::new(IndexStage::new(
            Arc::clone(&ports.index),
            ports.executor.clone(),
            config.index_policy(),
        )))?
        .stage(Arc::new(PersistStage::new(Arc::clone(&ports.store))))
}

/// Opens the audit sink named by `config`, in memory when no path is set.
pub fn open_audit_sink(config: &DocflowConfig) -> Result<Arc<dyn AuditSink>, AuditError> {
    match &config.audit_log_path {
        Some(path) => Ok(Arc::new(JsonlAuditLog::open(path)?)),
        None => Ok(Arc::new(InMemoryAuditLog::new())),
    }
}

/// Opens the document store named by `config`, in memory when no directory
/// is set.
pub async fn open_store(config: &DocflowConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match &config.store_dir {
        Some(dir) => Ok(Arc::new(FileDocumentStore::open(dir).await?)),
        None => Ok(Arc::new(InMemoryDocumentStore::new())),
    }
}
