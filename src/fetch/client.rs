//! HTTP client wrapper performing one streaming transfer attempt.
//!
//! Each attempt streams the response body in chunks straight to the
//! temporary file while feeding a running SHA-256 accumulator and a byte
//! counter; the whole body is never held in memory. Redirects are followed
//! up to a small fixed hop count; exceeding it fails the attempt.

use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::redirect::Policy;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, MAX_REDIRECT_HOPS};
use super::error::DownloadError;
use super::request::{ProgressObserver, ProgressUpdate};
use crate::user_agent;

/// Result of one successful transfer attempt.
#[derive(Debug, Clone)]
pub(crate) struct TransferAttempt {
    /// Bytes written to the temporary file.
    pub bytes_transferred: u64,
    /// Server-reported total size, when known.
    pub total_bytes: Option<u64>,
    /// SHA-256 of the streamed bytes, lowercase hex.
    pub sha256: String,
}

/// HTTP client for streaming downloads.
///
/// Created once per engine and reused across attempts and invocations,
/// taking advantage of connection pooling. The per-attempt timeout comes
/// from the request and is applied per call.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client.
    ///
    /// Configuration: 30s connect timeout, redirects bounded to
    /// [`MAX_REDIRECT_HOPS`], gzip decompression, identifying User-Agent.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .redirect(Policy::limited(MAX_REDIRECT_HOPS))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Performs exactly one transfer attempt into `temp_path`.
    ///
    /// The caller owns the temporary file's lifecycle: on any error the
    /// partial file is left for the caller to discard, so hash accumulation
    /// never spans two attempts (each call truncates and starts a fresh
    /// hasher).
    ///
    /// # Errors
    ///
    /// - [`DownloadError::Timeout`] when connect/read/total time runs out
    /// - [`DownloadError::TooManyRedirects`] past the hop limit
    /// - [`DownloadError::HttpStatus`] for non-2xx responses
    /// - [`DownloadError::Network`] for other transport failures
    /// - [`DownloadError::Io`] when writing the temporary file fails
    /// - [`DownloadError::Cancelled`] when the token fires mid-transfer
    #[instrument(skip(self, observer, cancel), fields(url = %url, temp = %temp_path.display()))]
    pub(crate) async fn fetch_once(
        &self,
        url: &str,
        temp_path: &Path,
        timeout: Duration,
        user_agent: Option<&str>,
        observer: Option<&ProgressObserver>,
        cancel: &CancellationToken,
    ) -> Result<TransferAttempt, DownloadError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(ua) = user_agent {
            request = request.header(reqwest::header::USER_AGENT, ua);
        }

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(DownloadError::Cancelled),
            result = request.send() => result.map_err(|e| classify_transport_error(url, e))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let total_bytes = response.content_length();
        let progress: Option<&(dyn Fn(&ProgressUpdate) + Send + Sync)> =
            observer.map(|o| o.as_ref());

        let file = File::create(temp_path)
            .await
            .map_err(|e| DownloadError::io(temp_path, e))?;
        let mut writer = BufWriter::new(file);
        let mut hasher = Sha256::new();
        let mut bytes_transferred = 0u64;
        let started = Instant::now();
        let mut stream = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => return Err(DownloadError::Cancelled),
                next = stream.next() => match next {
                    Some(result) => result.map_err(|e| classify_transport_error(url, e))?,
                    None => break,
                },
            };

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(temp_path, e))?;
            hasher.update(&chunk);
            bytes_transferred += chunk.len() as u64;

            if let Some(progress) = progress {
                let elapsed = started.elapsed();
                let secs = elapsed.as_secs_f64();
                progress(&ProgressUpdate {
                    bytes_transferred,
                    total_bytes,
                    elapsed,
                    bytes_per_sec: if secs > 0.0 {
                        bytes_transferred as f64 / secs
                    } else {
                        0.0
                    },
                });
            }
        }

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(temp_path, e))?;
        let file = writer.into_inner();
        file.sync_all()
            .await
            .map_err(|e| DownloadError::io(temp_path, e))?;

        let sha256 = hex::encode(hasher.finalize());
        debug!(bytes = bytes_transferred, digest = %sha256, "transfer attempt complete");

        Ok(TransferAttempt {
            bytes_transferred,
            total_bytes,
            sha256,
        })
    }
}

/// Maps a reqwest transport error onto the engine taxonomy.
fn classify_transport_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else if error.is_redirect() {
        DownloadError::too_many_redirects(url)
    } else {
        DownloadError::network(url, error)
    }
}
