//! Retry orchestrator: composes the resolver, fetcher, verifier, and
//! installer into a bounded retry loop.
//!
//! The loop is modeled as an explicit state machine rather than nested
//! control flow, so each transition is independently testable and
//! cancellation has well-defined interruption points:
//!
//! ```text
//! Resolving -> Attempting(n) -> Verifying(n) -> Installing -> Ok(outcome)
//!                  ^    |            |
//!                  |    +- retryable +-- mismatch, budget left
//!                  +--- backoff sleep ---+
//! ```
//!
//! Terminal failures are ordinary `Err` returns. The temporary file is
//! deleted on every failure path except an IO error during install, where
//! it is preserved so the caller can reinstall without re-downloading.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::client::{HttpClient, TransferAttempt};
use super::error::DownloadError;
use super::install::install;
use super::path::{ResolvedTarget, resolve_target};
use super::request::DownloadRequest;
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use super::verify::verify_digest;

/// Terminal result of a successful download.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// Absolute path of the installed file.
    pub path: PathBuf,
    /// Bytes transferred on the winning attempt.
    pub bytes_downloaded: u64,
    /// SHA-256 of the installed bytes, lowercase hex.
    pub sha256: String,
    /// Transfer attempts made, including the winning one.
    pub attempts: u32,
}

/// Orchestrator states. `Resolving` runs once; the `Attempting`/`Verifying`
/// pair loops under the retry budget; `Installing` runs once on the first
/// verified transfer. Terminal success/failure are function returns.
enum EngineState {
    Resolving,
    Attempting {
        target: ResolvedTarget,
        attempt: u32,
    },
    Verifying {
        target: ResolvedTarget,
        attempt: u32,
        transfer: TransferAttempt,
    },
    Installing {
        target: ResolvedTarget,
        attempts: u32,
        transfer: TransferAttempt,
    },
}

/// Download engine executing one sequential download per invocation.
///
/// The engine holds no mutable state; concurrent invocations only share
/// the HTTP connection pool and the filesystem, where uniquely suffixed
/// temporary files keep same-target invocations from corrupting each other
/// (the last atomic rename wins).
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    client: HttpClient,
    policy: RetryPolicy,
}

impl Default for DownloadEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadEngine {
    /// Creates an engine with the default backoff shape (1s base, 30s cap).
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    /// Creates an engine with a custom backoff shape. The attempt budget
    /// still comes from each request's `max_retries`.
    #[must_use]
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            client: HttpClient::new(),
            policy,
        }
    }

    /// Downloads the requested file, returning the installed path.
    ///
    /// # Errors
    ///
    /// Returns the classified terminal [`DownloadError`]; see the module
    /// docs for the cleanup guarantees on each failure path.
    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadOutcome, DownloadError> {
        self.download_cancellable(request, &CancellationToken::new())
            .await
    }

    /// Downloads the requested file, aborting with
    /// [`DownloadError::Cancelled`] when `cancel` fires. The token
    /// interrupts blocked reads and in-progress backoff sleeps.
    ///
    /// # Errors
    ///
    /// Returns the classified terminal [`DownloadError`].
    #[instrument(skip(self, request, cancel), fields(url = %request.url()))]
    pub async fn download_cancellable(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        let max_attempts = request.max_retries().saturating_add(1);
        let mut state = EngineState::Resolving;

        loop {
            state = match state {
                EngineState::Resolving => {
                    let target = resolve_target(
                        request.base_dir(),
                        request.subfolder(),
                        request.filename(),
                        request.url(),
                    )
                    .await?;
                    if target.already_exists && !request.overwrite() {
                        // No transfer for a destination we may not replace;
                        // the installer re-checks to cover the race window.
                        return Err(DownloadError::already_exists(target.final_path));
                    }
                    info!(path = %target.final_path.display(), "downloading");
                    EngineState::Attempting { target, attempt: 1 }
                }

                EngineState::Attempting { target, attempt } => {
                    debug!(attempt, max_attempts, "attempting transfer");
                    let result = self
                        .client
                        .fetch_once(
                            request.url().as_str(),
                            &target.temp_path,
                            request.timeout(),
                            request.user_agent(),
                            request.observer(),
                            cancel,
                        )
                        .await;
                    match result {
                        Ok(transfer) => {
                            debug!(
                                bytes = transfer.bytes_transferred,
                                server_total = ?transfer.total_bytes,
                                "transfer complete, verifying"
                            );
                            EngineState::Verifying {
                                target,
                                attempt,
                                transfer,
                            }
                        }
                        Err(error) => {
                            let attempt = self
                                .next_attempt_or_fail(
                                    request,
                                    &target,
                                    error,
                                    attempt,
                                    max_attempts,
                                    cancel,
                                )
                                .await?;
                            EngineState::Attempting { target, attempt }
                        }
                    }
                }

                EngineState::Verifying {
                    target,
                    attempt,
                    transfer,
                } => match verify_digest(&transfer.sha256, request.expected_sha256(), attempt) {
                    Ok(()) => EngineState::Installing {
                        target,
                        attempts: attempt,
                        transfer,
                    },
                    Err(error) => {
                        let attempt = self
                            .next_attempt_or_fail(
                                request,
                                &target,
                                error,
                                attempt,
                                max_attempts,
                                cancel,
                            )
                            .await?;
                        EngineState::Attempting { target, attempt }
                    }
                },

                EngineState::Installing {
                    target,
                    attempts,
                    transfer,
                } => {
                    install(&target, request.overwrite()).await?;
                    info!(
                        path = %target.final_path.display(),
                        bytes = transfer.bytes_transferred,
                        attempts,
                        "download complete"
                    );
                    return Ok(DownloadOutcome {
                        path: target.final_path,
                        bytes_downloaded: transfer.bytes_transferred,
                        sha256: transfer.sha256,
                        attempts,
                    });
                }
            };
        }
    }

    /// Handles one failed attempt: discard the partial temp file, then
    /// either sleep out the backoff and return the next attempt number, or
    /// map the failure to its terminal form.
    async fn next_attempt_or_fail(
        &self,
        request: &DownloadRequest,
        target: &ResolvedTarget,
        error: DownloadError,
        attempt: u32,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<u32, DownloadError> {
        // Partial data must never leak into the next attempt's hash
        discard_temp(&target.temp_path).await;

        if matches!(error, DownloadError::Cancelled) {
            return Err(DownloadError::Cancelled);
        }

        let failure_type = classify_error(&error);
        match self.policy.should_retry(failure_type, attempt, max_attempts) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                warn!(
                    url = %request.url(),
                    attempt = next_attempt,
                    max_attempts,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "retrying download"
                );
                tokio::select! {
                    () = cancel.cancelled() => Err(DownloadError::Cancelled),
                    () = tokio::time::sleep(delay) => Ok(next_attempt),
                }
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(url = %request.url(), %reason, "not retrying download");
                Err(terminal_error(
                    error,
                    failure_type,
                    request.url().as_str(),
                    attempt,
                ))
            }
        }
    }
}

/// Maps the final attempt's failure to the terminal error surfaced to the
/// caller. A permanent failure passes through unchanged; an exhausted
/// transient failure is wrapped, except a hash mismatch which keeps its
/// own classification with the attempt count.
fn terminal_error(
    error: DownloadError,
    failure_type: FailureType,
    url: &str,
    attempts: u32,
) -> DownloadError {
    match (failure_type, error) {
        (
            FailureType::Transient,
            DownloadError::HashMismatch {
                expected, actual, ..
            },
        ) => DownloadError::hash_mismatch(expected, actual, attempts),
        (FailureType::Transient, error) => DownloadError::retries_exhausted(url, attempts, error),
        (FailureType::Permanent, error) => error,
    }
}

/// Removes the temporary file, tolerating its absence.
async fn discard_temp(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove temporary file");
    }
}
