//! Test assertions for document runs.

use super::{FakeIndexService, FakeUploadService};
use crate::context::ProcessingContext;
use crate::core::{DocumentStatus, ErrorKind};
use std::collections::HashSet;

/// Asserts that the run finished with `expected`.
pub fn assert_status(ctx: &ProcessingContext, expected: DocumentStatus) {
    assert_eq!(
        ctx.status(),
        expected,
        "Expected status {expected}, got {} (errors: {:?})",
        ctx.status(),
        ctx.errors()
    );
}

/// Asserts the kinds of the recorded errors, in order.
pub fn assert_error_kinds(ctx: &ProcessingContext, expected: &[ErrorKind]) {
    let kinds: Vec<ErrorKind> = ctx.errors().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, expected, "Unexpected errors: {:?}", ctx.errors());
}

/// Asserts that every live remote resource belongs to a completed run.
pub fn assert_no_orphans(
    runs: &[ProcessingContext],
    uploads: &FakeUploadService,
    index: &FakeIndexService,
) {
    let retained: HashSet<&str> = runs
        .iter()
        .flat_map(|ctx| ctx.retained_resource_ids())
        .map(|r| r.id.as_str())
        .collect();

    let orphans: Vec<String> = uploads
        .live_ids()
        .into_iter()
        .chain(index.live_ids())
        .filter(|id| !retained.contains(id.as_str()))
        .collect();

    assert!(orphans.is_empty(), "Orphaned remote resources: {orphans:?}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClassifiedError;

    #[test]
    fn test_assert_status() {
        let mut ctx = ProcessingContext::new(b"x".to_vec());
        ctx.finish(DocumentStatus::Failed).unwrap();
        assert_status(&ctx, DocumentStatus::Failed);
    }

    #[test]
    #[should_panic(expected = "Expected status completed")]
    fn test_assert_status_fails() {
        let ctx = ProcessingContext::new(b"x".to_vec());
        assert_status(&ctx, DocumentStatus::Completed);
    }

    #[test]
    fn test_assert_error_kinds() {
        let mut ctx = ProcessingContext::new(b"x".to_vec());
        ctx.record_error(ClassifiedError::new(ErrorKind::Validation, "validate", "empty"));
        assert_error_kinds(&ctx, &[ErrorKind::Validation]);
    }

    #[test]
    #[should_panic(expected = "Orphaned remote resources")]
    fn test_assert_no_orphans_detects_leak() {
        let uploads = FakeUploadService::new();
        uploads.seed("file-9");
        assert_no_orphans(&[], &uploads, &FakeIndexService::new());
    }
}
