//! Utility functions for run identifiers and timestamps.

pub mod timestamps;

pub use timestamps::{format_iso8601, iso_timestamp, now_utc, Timestamp};

use uuid::Uuid;

/// Generates a time-ordered identifier for a pipeline run.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_run_id_is_v7() {
        let id = generate_run_id();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_run_ids_are_ordered() {
        let a = generate_run_id();
        let b = generate_run_id();
        assert!(a <= b);
    }
}
