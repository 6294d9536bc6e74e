//! Download request value and progress reporting types.
//!
//! A [`DownloadRequest`] is an immutable description of one download. It is
//! produced by a validating [`DownloadRequestBuilder`] so that every
//! invariant (URL scheme, digest shape, positive timeout) holds before the
//! engine ever touches the network or the filesystem.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use super::constants::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};
use super::error::DownloadError;

/// One advisory progress sample, emitted zero or more times per attempt.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Bytes written to the temporary file so far in this attempt.
    pub bytes_transferred: u64,
    /// Server-reported total size, when known.
    pub total_bytes: Option<u64>,
    /// Time since the attempt's transfer started.
    pub elapsed: Duration,
    /// Instantaneous transfer rate in bytes per second.
    pub bytes_per_sec: f64,
}

/// Side-channel progress observer. Purely informational: the engine never
/// consults it for control flow.
pub type ProgressObserver = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

/// Immutable description of a single download.
#[derive(Clone)]
pub struct DownloadRequest {
    url: Url,
    base_dir: PathBuf,
    subfolder: String,
    filename: Option<String>,
    overwrite: bool,
    expected_sha256: Option<String>,
    timeout: Duration,
    max_retries: u32,
    user_agent: Option<String>,
    observer: Option<ProgressObserver>,
}

impl DownloadRequest {
    /// Starts building a request for `url` into `base_dir`.
    pub fn builder(url: impl Into<String>, base_dir: impl Into<PathBuf>) -> DownloadRequestBuilder {
        DownloadRequestBuilder {
            url: url.into(),
            base_dir: base_dir.into(),
            subfolder: String::new(),
            filename: None,
            overwrite: true,
            expected_sha256: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            user_agent: None,
            observer: None,
        }
    }

    /// The validated source URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The base content directory downloads must stay within.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Subfolder under the base directory (may be nested, may be empty).
    #[must_use]
    pub fn subfolder(&self) -> &str {
        &self.subfolder
    }

    /// Explicit destination filename, when the caller supplied one.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Whether an existing file at the destination may be replaced.
    #[must_use]
    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Expected SHA-256 digest, lowercase hex, when verification was requested.
    #[must_use]
    pub fn expected_sha256(&self) -> Option<&str> {
        self.expected_sha256.as_deref()
    }

    /// Per-attempt timeout covering connect, reads, and total elapsed time.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Maximum retry attempts after the initial one.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// User-Agent override, when the caller supplied one.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Progress observer, when the caller attached one.
    #[must_use]
    pub fn observer(&self) -> Option<&ProgressObserver> {
        self.observer.as_ref()
    }
}

impl fmt::Debug for DownloadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("url", &self.url.as_str())
            .field("base_dir", &self.base_dir)
            .field("subfolder", &self.subfolder)
            .field("filename", &self.filename)
            .field("overwrite", &self.overwrite)
            .field("expected_sha256", &self.expected_sha256)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("user_agent", &self.user_agent)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Builder for [`DownloadRequest`]; `build()` enforces the invariants.
#[derive(Clone)]
pub struct DownloadRequestBuilder {
    url: String,
    base_dir: PathBuf,
    subfolder: String,
    filename: Option<String>,
    overwrite: bool,
    expected_sha256: Option<String>,
    timeout: Duration,
    max_retries: u32,
    user_agent: Option<String>,
    observer: Option<ProgressObserver>,
}

impl DownloadRequestBuilder {
    /// Sets the subfolder under the base directory (nested OK).
    #[must_use]
    pub fn subfolder(mut self, subfolder: impl Into<String>) -> Self {
        self.subfolder = subfolder.into();
        self
    }

    /// Sets an explicit destination filename instead of deriving one from
    /// the URL.
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Sets whether an existing destination file may be replaced.
    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Requests integrity verification against a SHA-256 hex digest.
    #[must_use]
    pub fn expected_sha256(mut self, digest: impl Into<String>) -> Self {
        self.expected_sha256 = Some(digest.into());
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum retry count (retries after the initial attempt).
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Overrides the User-Agent header for this download.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Attaches an advisory progress observer.
    #[must_use]
    pub fn observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validates the invariants and produces the request.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidPath`] for a URL that doesn't parse,
    /// lacks a host, or uses a scheme other than http/https, and
    /// [`DownloadError::InvalidRequest`] for a malformed expected digest or
    /// a zero timeout.
    pub fn build(self) -> Result<DownloadRequest, DownloadError> {
        let url = Url::parse(self.url.trim())
            .map_err(|e| DownloadError::invalid_path(format!("URL '{}': {e}", self.url)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_path(format!(
                "URL '{url}' must use http or https"
            )));
        }
        if url.host_str().is_none() {
            return Err(DownloadError::invalid_path(format!(
                "URL '{url}' is missing a hostname"
            )));
        }

        if self.timeout.is_zero() {
            return Err(DownloadError::invalid_request("timeout must be positive"));
        }

        let expected_sha256 = self
            .expected_sha256
            .as_deref()
            .map(str::trim)
            .filter(|digest| !digest.is_empty())
            .map(|digest| {
                if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
                    Ok(digest.to_ascii_lowercase())
                } else {
                    Err(DownloadError::invalid_request(format!(
                        "expected SHA-256 must be a 64-character hex string, got '{digest}'"
                    )))
                }
            })
            .transpose()?;

        Ok(DownloadRequest {
            url,
            base_dir: self.base_dir,
            subfolder: self.subfolder,
            filename: self.filename,
            overwrite: self.overwrite,
            expected_sha256,
            timeout: self.timeout,
            max_retries: self.max_retries,
            user_agent: self.user_agent,
            observer: self.observer,
        })
    }
}
