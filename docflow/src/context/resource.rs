//! Remote resource identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of remote resource a stage created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceKind {
    /// A file held by the upload service.
    UploadedFile,
    /// An entry registered with the semantic index.
    IndexEntry,
    /// Any other collaborator-defined resource.
    Custom(String),
}

impl ResourceKind {
    /// Returns the canonical name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::UploadedFile => "uploaded-file",
            Self::IndexEntry => "index-entry",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ResourceKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "uploaded-file" => Self::UploadedFile,
            "index-entry" => Self::IndexEntry,
            _ => Self::Custom(value),
        }
    }
}

impl From<ResourceKind> for String {
    fn from(value: ResourceKind) -> Self {
        match value {
            ResourceKind::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

/// A remote resource created during a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteResource {
    /// What kind of resource it is.
    pub kind: ResourceKind,
    /// The identifier assigned by the remote service.
    pub id: String,
}

impl RemoteResource {
    /// Creates a new remote resource reference.
    #[must_use]
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl fmt::Display for RemoteResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
