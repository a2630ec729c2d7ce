//! Classification of `reqwest` failures into remote error kinds.

use crate::errors::{RemoteError, RemoteErrorKind};
use std::time::Duration;

impl RemoteError {
    /// Classifies a transport-level `reqwest` error.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        let kind = if err.is_timeout() {
            RemoteErrorKind::Timeout
        } else if err.is_connect() || err.is_request() {
            RemoteErrorKind::Connectivity
        } else if err.is_decode() || err.is_body() {
            RemoteErrorKind::Server
        } else if err.is_builder() {
            RemoteErrorKind::Validation
        } else {
            RemoteErrorKind::Unknown
        };
        Self::new(kind, err.to_string())
    }

    /// Classifies a non-success HTTP response, honouring `Retry-After`.
    #[must_use]
    pub fn from_response(response: &reqwest::Response) -> Self {
        let status = response.status();
        let mut err = Self::from_status(
            status.as_u16(),
            status.canonical_reason().unwrap_or("unexpected status"),
        );
        if let Some(after) = retry_after(response.headers()) {
            err = err.with_retry_after(after);
        }
        err
    }
}

/// Parses a `Retry-After` header expressed in seconds.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_retry_after_http_date_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }
}
