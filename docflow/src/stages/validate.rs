//! Input validation guard.

use super::Stage;
use crate::compensation::CompensatingTransaction;
use crate::context::ProcessingContext;
use crate::core::{StageKind, StageOutput};
use async_trait::async_trait;
use regex::bytes::Regex;
use std::sync::OnceLock;

/// Bytes searched for the PDF header.
const HEADER_WINDOW: usize = 1024;

fn pdf_header() -> Option<&'static Regex> {
    static HEADER: OnceLock<Option<Regex>> = OnceLock::new();
    HEADER
        .get_or_init(|| Regex::new(r"%PDF-\d\.\d").ok())
        .as_ref()
}

/// Rejects empty, oversized or non-PDF input before any remote call.
#[derive(Debug, Clone)]
pub struct ValidateStage {
    max_bytes: usize,
    require_pdf_header: bool,
}

impl ValidateStage {
    /// Stage name.
    pub const NAME: &'static str = "validate";

    /// Creates the stage.
    #[must_use]
    pub fn new(max_bytes: usize, require_pdf_header: bool) -> Self {
        Self {
            max_bytes,
            require_pdf_header,
        }
    }

    fn check(&self, bytes: &[u8]) -> Result<(), String> {
        if bytes.is_empty() {
            return Err("document is empty".to_string());
        }
        if bytes.len() > self.max_bytes {
            return Err(format!(
                "document is {} bytes; the limit is {}",
                bytes.len(),
                self.max_bytes
            ));
        }
        if self.require_pdf_header {
            let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
            let found = pdf_header().is_some_and(|re| re.is_match(window));
            if !found {
                return Err("missing %PDF header".to_string());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Stage for ValidateStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Guard
    }

    async fn execute(
        &self,
        ctx: &mut ProcessingContext,
        _tx: &mut CompensatingTransaction,
    ) -> StageOutput {
        match self.check(ctx.raw_bytes()) {
            Ok(()) => StageOutput::ok(),
            Err(message) => StageOutput::invalid(Self::NAME, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_pdf() {
        let stage = ValidateStage::new(1024, true);
        assert!(stage.check(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3").is_ok());
    }

    #[test]
    fn test_rejects_empty() {
        let stage = ValidateStage::new(1024, false);
        assert_eq!(stage.check(b""), Err("document is empty".to_string()));
    }

    #[test]
    fn test_rejects_oversized() {
        let stage = ValidateStage::new(4, false);
        let err = stage.check(b"%PDF-1.4").unwrap_err();
        assert!(err.contains("limit is 4"));
    }

    #[test]
    fn test_header_check_is_optional() {
        assert!(ValidateStage::new(1024, true).check(b"plain text").is_err());
        assert!(ValidateStage::new(1024, false).check(b"plain text").is_ok());
    }

    #[test]
    fn test_header_needs_a_version() {
        let stage = ValidateStage::new(1024, true);
        assert!(stage.check(b"%PDF-").is_err());
        assert!(stage.check(b"%PDF-1.").is_err());
        assert!(stage.check(b"%PDF-1.3").is_ok());
    }

    #[test]
    fn test_header_after_leading_junk() {
        let mut bytes = vec![b' '; 100];
        bytes.extend_from_slice(b"%PDF-2.0");
        assert!(ValidateStage::new(4096, true).check(&bytes).is_ok());

        let mut late = vec![b' '; HEADER_WINDOW];
        late.extend_from_slice(b"%PDF-2.0");
        assert!(ValidateStage::new(4096, true).check(&late).is_err());
    }
}
