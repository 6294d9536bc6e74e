//! Error types for the download engine.
//!
//! Every failure is classified exactly once at the point where it occurs;
//! the orchestrator only consumes the classification (see
//! [`classify_error`](super::retry::classify_error)) and never re-labels an
//! error on its way out.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching a file into the managed tree.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The URL, subfolder, or filename resolves to something unusable:
    /// wrong scheme, traversal outside the base directory, empty filename.
    #[error("invalid path: {reason}")]
    InvalidPath {
        /// Human-readable description of what was wrong.
        reason: String,
    },

    /// The request itself is malformed (bad expected-digest shape, zero
    /// timeout). Caught before any network or filesystem activity.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Human-readable description of what was wrong.
        reason: String,
    },

    /// A file already occupies the destination and overwriting is disabled.
    #[error("file already exists: {path}")]
    AlreadyExists {
        /// The occupied destination path.
        path: PathBuf,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors,
    /// mid-stream disconnects).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion (connect, read, or total).
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The redirect hop limit was exceeded while following 3xx responses.
    #[error("too many redirects downloading {url}")]
    TooManyRedirects {
        /// The URL whose redirect chain was too long.
        url: String,
    },

    /// File system error (create directory, write temp file, rename).
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Downloaded content hashed to something other than the expected
    /// digest on every attempt.
    #[error("SHA-256 mismatch after {attempts} attempt(s): expected {expected}, got {actual}")]
    HashMismatch {
        /// The digest the caller asked for, lowercase hex.
        expected: String,
        /// The digest the downloaded bytes actually produced, lowercase hex.
        actual: String,
        /// How many transfer attempts were made.
        attempts: u32,
    },

    /// Every attempt produced a retryable failure and the retry budget ran out.
    #[error("retries exhausted after {attempts} attempt(s) downloading {url}: {source}")]
    RetriesExhausted {
        /// The URL that kept failing.
        url: String,
        /// How many transfer attempts were made.
        attempts: u32,
        /// The failure from the final attempt.
        #[source]
        source: Box<DownloadError>,
    },

    /// The external cancellation signal fired before the download finished.
    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Creates an invalid-path error.
    pub fn invalid_path(reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            reason: reason.into(),
        }
    }

    /// Creates an invalid-request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Creates an already-exists error.
    pub fn already_exists(path: impl Into<PathBuf>) -> Self {
        Self::AlreadyExists { path: path.into() }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a redirect-limit error.
    pub fn too_many_redirects(url: impl Into<String>) -> Self {
        Self::TooManyRedirects { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a hash mismatch error for the given attempt.
    pub fn hash_mismatch(
        expected: impl Into<String>,
        actual: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self::HashMismatch {
            expected: expected.into(),
            actual: actual.into(),
            attempts,
        }
    }

    /// Creates a retries-exhausted error wrapping the final attempt's failure.
    pub fn retries_exhausted(url: impl Into<String>, attempts: u32, source: DownloadError) -> Self {
        Self::RetriesExhausted {
            url: url.into(),
            attempts,
            source: Box::new(source),
        }
    }

    /// Returns the number of transfer attempts recorded on this error, when
    /// the variant carries one.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::HashMismatch { attempts, .. } | Self::RetriesExhausted { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` or
// `From<std::io::Error>` because our error variants require context
// (url, path) that the source errors don't provide. The helper
// constructor methods are the pattern callers should use.
