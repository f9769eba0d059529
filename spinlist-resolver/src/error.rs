//! Error types for spinlist-resolver
//!
//! Per-item failures (`ResolveError`) are converted into `Unresolved`
//! report entries by the pipeline. Only `RunError` escapes a run.

use std::time::Duration;
use thiserror::Error;

/// Malformed transcript input
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// Transcript is empty or whitespace only
    #[error("Transcript is empty after trimming")]
    EmptyTranscript,
}

/// Invalid pattern rule declaration
#[derive(Debug, Error)]
pub enum PatternError {
    /// Regex failed to compile
    #[error("Pattern '{id}' does not compile: {source}")]
    InvalidRegex {
        id: String,
        #[source]
        source: regex::Error,
    },

    /// Required named capture group absent
    #[error("Pattern '{id}' is missing the named group '{group}'")]
    MissingGroup { id: String, group: &'static str },

    /// Base weight outside (0, 1]
    #[error("Pattern '{id}' has base weight {weight}, expected (0, 1]")]
    InvalidWeight { id: String, weight: f32 },

    /// Two rules share an id
    #[error("Duplicate pattern id '{0}'")]
    DuplicateId(String),
}

/// Failure reported by a catalog search backend for a single attempt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Connection, DNS or timeout failure
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 5xx
    #[error("Server error {0}")]
    Server(u16),

    /// HTTP 429, with the server's retry-after hint if it sent one
    #[error("Too many requests (retry after {retry_after:?})")]
    TooManyRequests { retry_after: Option<Duration> },

    /// HTTP 4xx other than 429
    #[error("Client error {status}: {message}")]
    Client { status: u16, message: String },

    /// Response body could not be decoded
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl CatalogError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CatalogError::Network(_)
                | CatalogError::Server(_)
                | CatalogError::TooManyRequests { .. }
        )
    }

    /// Server-provided retry hint (429 only)
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CatalogError::TooManyRequests { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Stable root-cause key used to detect systemic failures
    ///
    /// Free-text details are excluded so that e.g. every connection refusal
    /// maps to the same signature.
    pub fn signature(&self) -> String {
        match self {
            CatalogError::Network(_) => "network".to_string(),
            CatalogError::Server(status) => format!("http-{}", status),
            CatalogError::TooManyRequests { .. } => "http-429".to_string(),
            CatalogError::Client { status, .. } => format!("http-{}", status),
            CatalogError::Malformed(_) => "malformed-response".to_string(),
        }
    }
}

/// Resolution failure after the client's retry policy has run
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    /// No rate-limit token became available within the maximum wait
    #[error("Rate limit token not available within {waited:?}")]
    RateLimitTimeout { waited: Duration },

    /// Search failed permanently or retries were exhausted
    #[error("Search failed after {attempts} attempt(s): {cause}")]
    SearchFailed { attempts: u32, cause: CatalogError },

    /// Run deadline passed, or the run was cancelled, before the next search
    #[error("Stopped before the next catalog search (cancelled: {cancelled})")]
    Stopped { cancelled: bool },
}

/// Transcript acquisition failure
#[derive(Debug, Error)]
pub enum TranscriptError {
    /// Transcript could not be fetched or read
    #[error("Transcript unavailable for '{id}': {reason}")]
    TranscriptUnavailable { id: String, reason: String },
}

/// Playlist sink failure
#[derive(Debug, Error)]
pub enum PlaylistError {
    /// Sink storage failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Playlist document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Handle does not refer to a playlist created by this sink
    #[error("Unknown playlist: {0}")]
    UnknownPlaylist(String),
}

/// Run-level fatal errors
#[derive(Debug, Error)]
pub enum RunError {
    /// Transcript was malformed
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Transcript source failed
    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    /// Every recommendation failed for the same root cause
    #[error("All {count} recommendations failed with the same cause ({signature}): {example}")]
    SystemicResolutionFailure {
        signature: String,
        count: usize,
        example: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CatalogError::Network("refused".into()).is_transient());
        assert!(CatalogError::Server(502).is_transient());
        assert!(CatalogError::TooManyRequests { retry_after: None }.is_transient());
        assert!(!CatalogError::Client {
            status: 401,
            message: "unauthorized".into()
        }
        .is_transient());
        assert!(!CatalogError::Malformed("eof".into()).is_transient());
    }

    #[test]
    fn test_signature_ignores_detail_text() {
        let a = CatalogError::Network("connection refused".into());
        let b = CatalogError::Network("dns failure".into());
        assert_eq!(a.signature(), b.signature());

        let auth = CatalogError::Client {
            status: 401,
            message: "bad token".into(),
        };
        assert_eq!(auth.signature(), "http-401");
    }

    #[test]
    fn test_retry_after_only_for_429() {
        let hint = Duration::from_secs(2);
        assert_eq!(
            CatalogError::TooManyRequests {
                retry_after: Some(hint)
            }
            .retry_after(),
            Some(hint)
        );
        assert_eq!(CatalogError::Server(503).retry_after(), None);
    }
}
