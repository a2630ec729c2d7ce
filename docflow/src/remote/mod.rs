//! Contracts for the remote collaborators the pipeline calls.
//!
//! The pipeline treats these services as black boxes. Each call returns a
//! [`RemoteError`] tagged with a [`RemoteErrorKind`](crate::errors::RemoteErrorKind)
//! so the retry executor can classify failures without knowing anything
//! about the transport.

#[cfg(feature = "http")]
mod http;

use crate::core::Fingerprint;
use crate::errors::RemoteError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Descriptor sent alongside document bytes to the extraction service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// Model to use, if the service supports several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Name of the output schema the service should fill.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Free-form instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl ExtractionRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the schema name.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// Structured result returned by the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// The structured payload.
    pub payload: serde_json::Value,
    /// The model that produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Number of pages the service saw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
}

impl Extraction {
    /// Creates an extraction result.
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            model: None,
            page_count: None,
        }
    }
}

/// Metadata sent with an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// The document fingerprint, usable as an idempotency key.
    pub fingerprint: Fingerprint,
    /// MIME type of the bytes.
    pub content_type: String,
}

impl UploadRequest {
    /// Creates a PDF upload request for `fingerprint`.
    #[must_use]
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            content_type: "application/pdf".to_string(),
        }
    }
}

/// A request to register a document with the semantic index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRequest {
    /// The document fingerprint.
    pub fingerprint: Fingerprint,
    /// The uploaded file the entry points at.
    pub file_id: String,
    /// Structured content to index.
    pub payload: serde_json::Value,
}

/// Result of a delete-by-id call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteResult {
    /// The resource existed and was deleted.
    Deleted,
    /// The resource did not exist.
    NotFound,
}

/// Remote structured-extraction service.
#[async_trait]
pub trait ExtractionService: Send + Sync + Debug {
    /// Extracts structured content from document bytes.
    async fn extract(
        &self,
        bytes: &[u8],
        request: &ExtractionRequest,
    ) -> Result<Extraction, RemoteError>;
}

/// Remote content-addressable upload service.
#[async_trait]
pub trait UploadService: Send + Sync + Debug {
    /// Uploads bytes and returns the remote file id.
    async fn upload(&self, bytes: &[u8], request: &UploadRequest) -> Result<String, RemoteError>;

    /// Deletes a file by id. Deleting a missing file must not fail.
    async fn delete(&self, file_id: &str) -> Result<DeleteResult, RemoteError>;
}

/// Remote semantic-index service.
#[async_trait]
pub trait IndexService: Send + Sync + Debug {
    /// Registers an index entry and returns its id.
    async fn register(&self, request: &IndexRequest) -> Result<String, RemoteError>;

    /// Deletes an index entry by id. Deleting a missing entry must not fail.
    async fn delete(&self, entry_id: &str) -> Result<DeleteResult, RemoteError>;
}
