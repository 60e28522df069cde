//! Unified error types for hntop.
//!
//! Every variant carries a stable uppercase code prefix so log lines can be
//! grepped and aggregated regardless of the message detail.

use tokio_rusqlite::rusqlite;

/// Unified error type shared by the store, the fetch gateway and the stats client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connect failure, reset, redirect limit exceeded or other transport fault.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Request or body read exceeded its deadline.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Upstream answered with a non-2xx status.
    #[error("HTTP_STATUS: {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Response was not an HTML document.
    #[error("CONTENT_TYPE: {0}")]
    ContentType(String),

    /// Markup or payload could not be decoded.
    #[error("PARSE_ERROR: {0}")]
    Parse(String),

    /// The upstream resource no longer exists.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Upstream is throttling us.
    #[error("RATE_LIMITED: {0}")]
    RateLimited(String),

    /// Target URL is malformed or uses an unsupported scheme.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The caller's cancellation token fired while waiting.
    #[error("CANCELLED")]
    Cancelled,

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// True when the error signals permanent removal upstream.
    pub fn is_gone_upstream(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited(_))
    }

    /// Classify a non-success status code into the matching variant.
    pub fn from_status(status: u16, url: &str) -> Self {
        match status {
            404 | 410 => Error::NotFound(url.to_string()),
            429 => Error::RateLimited(url.to_string()),
            _ => Error::HttpStatus { status, url: url.to_string() },
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("item 42".to_string());
        assert!(err.to_string().contains("NOT_FOUND"));
        assert!(err.to_string().contains("item 42"));

        let err = Error::HttpStatus { status: 500, url: "https://example.com".into() };
        assert_eq!(err.to_string(), "HTTP_STATUS: 500 for https://example.com");
    }

    #[test]
    fn test_from_status_classification() {
        assert!(Error::from_status(404, "u").is_gone_upstream());
        assert!(Error::from_status(410, "u").is_gone_upstream());
        assert!(Error::from_status(429, "u").is_rate_limited());

        let other = Error::from_status(503, "u");
        assert!(matches!(other, Error::HttpStatus { status: 503, .. }));
        assert!(!other.is_gone_upstream());
        assert!(!other.is_rate_limited());
    }

    #[test]
    fn test_rusqlite_error_maps_to_database() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Database(_)));
        assert!(err.to_string().starts_with("STORE_ERROR"));
    }
}
