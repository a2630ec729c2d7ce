//! Runtime configuration for the document pipeline.
//!
//! [`DocflowConfig`] is plain serde data. Every field has a default, so a
//! partial JSON document only needs the values it overrides:
//!
//! ```json
//! {
//!   "workers": 8,
//!   "retry": { "max_attempts": 3, "initial_wait_ms": 500 },
//!   "upload_retry": { "max_attempts": 6 },
//!   "audit_log_path": "/var/lib/docflow/audit.jsonl"
//! }
//! ```

use crate::errors::ConfigError;
use crate::observability::LogFormat;
use crate::retry::{JitterStrategy, RetryPolicy};
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_pipeline_name() -> String {
    "docflow".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_max_document_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_cleanup_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_wait_ms() -> u64 {
    2_000
}

fn default_call_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_max_wait_ms() -> u64 {
    30_000
}

/// Retry schedule in serializable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, including the first call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait before the second attempt, in milliseconds.
    #[serde(default = "default_initial_wait_ms")]
    pub initial_wait_ms: u64,
    /// Upper bound on any single wait, in milliseconds.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Per-attempt timeout, in milliseconds. `null` disables it.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: Option<u64>,
    /// Jitter applied to each wait.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_wait_ms: default_initial_wait_ms(),
            max_wait_ms: default_max_wait_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl RetrySettings {
    /// Builds the policy these settings describe.
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new()
            .with_max_attempts(self.max_attempts)
            .with_initial_wait(Duration::from_millis(self.initial_wait_ms))
            .with_max_wait(Duration::from_millis(self.max_wait_ms))
            .with_jitter(self.jitter);
        match self.call_timeout_ms {
            Some(ms) => policy.with_call_timeout(Duration::from_millis(ms)),
            None => policy,
        }
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::new(
                format!("{field}.max_attempts"),
                "must be at least 1",
            ));
        }
        if self.max_wait_ms < self.initial_wait_ms {
            return Err(ConfigError::new(
                format!("{field}.max_wait_ms"),
                "must not be below initial_wait_ms",
            ));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(ConfigError::new(
                format!("{field}.call_timeout_ms"),
                "must be positive when set",
            ));
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocflowConfig {
    /// Name used in spans and events.
    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,
    /// Documents processed concurrently by the worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Largest accepted document.
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
    /// Reject input that does not start with a PDF header.
    #[serde(default = "default_true")]
    pub require_pdf_header: bool,
    /// Time limit for each cleanup action, in milliseconds.
    #[serde(default = "default_cleanup_timeout_ms")]
    pub cleanup_timeout_ms: u64,
    /// Retry schedule for every remote call.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Override for extraction calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_retry: Option<RetrySettings>,
    /// Override for upload calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_retry: Option<RetrySettings>,
    /// Override for index calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_retry: Option<RetrySettings>,
    /// JSONL audit log location. In-memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log_path: Option<PathBuf>,
    /// Directory of the file-backed store. In-memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for DocflowConfig {
    fn default() -> Self {
        Self {
            pipeline_name: default_pipeline_name(),
            workers: default_workers(),
            max_document_bytes: default_max_document_bytes(),
            require_pdf_header: true,
            cleanup_timeout_ms: default_cleanup_timeout_ms(),
            retry: RetrySettings::default(),
            extraction_retry: None,
            upload_retry: None,
            index_retry: None,
            audit_log_path: None,
            store_dir: None,
            log_format: LogFormat::default(),
        }
    }
}

impl DocflowConfig {
    /// Parses a JSON document and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| ConfigError::new("<root>", err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Checks field ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline_name.trim().is_empty() {
            return Err(ConfigError::new("pipeline_name", "must not be empty"));
        }
        if self.workers == 0 {
            return Err(ConfigError::new("workers", "must be at least 1"));
        }
        if self.max_document_bytes == 0 {
            return Err(ConfigError::new("max_document_bytes", "must be positive"));
        }
        if self.cleanup_timeout_ms == 0 {
            return Err(ConfigError::new("cleanup_timeout_ms", "must be positive"));
        }
        self.retry.validate("retry")?;
        for (field, settings) in [
            ("extraction_retry", &self.extraction_retry),
            ("upload_retry", &self.upload_retry),
            ("index_retry", &self.index_retry),
        ] {
            if let Some(settings) = settings {
                settings.validate(field)?;
            }
        }
        Ok(())
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = name.into();
        self
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the document size limit.
    #[must_use]
    pub fn with_max_document_bytes(mut self, bytes: usize) -> Self {
        self.max_document_bytes = bytes;
        self
    }

    /// Enables or disables the PDF header check.
    #[must_use]
    pub fn with_require_pdf_header(mut self, require: bool) -> Self {
        self.require_pdf_header = require;
        self
    }

    /// Sets the per-action cleanup timeout.
    #[must_use]
    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the default retry schedule.
    #[must_use]
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the audit log path.
    #[must_use]
    pub fn with_audit_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log_path = Some(path.into());
        self
    }

    /// Returns the cleanup timeout.
    #[must_use]
    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }

    /// Returns the policy for extraction calls.
    #[must_use]
    pub fn extraction_policy(&self) -> RetryPolicy {
        self.extraction_retry.as_ref().unwrap_or(&self.retry).to_policy()
    }

    /// Returns the policy for upload calls.
    #[must_use]
    pub fn upload_policy(&self) -> RetryPolicy {
        self.upload_retry.as_ref().unwrap_or(&self.retry).to_policy()
    }

    /// Returns the policy for index calls.
    #[must_use]
    pub fn index_policy(&self) -> RetryPolicy {
        self.index_retry.as_ref().unwrap_or(&self.retry).to_policy()
    }
}
