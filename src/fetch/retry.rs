//! Backoff policy and failure classification for transient download errors.
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - may succeed on retry (timeouts, 5xx,
//!   mid-stream disconnects, hash mismatches)
//! - [`FailureType::Permanent`] - retrying cannot help (4xx, local IO,
//!   redirect loops)
//!
//! [`RetryPolicy`] then decides whether another attempt is allowed and how
//! long to wait: `delay(attempt) = min(cap, base * 2^(attempt-1))`, with
//! bounded multiplicative jitter so parallel invocations don't retry in
//! lockstep.

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use super::DownloadError;
use super::constants::{BACKOFF_BASE_DELAY, BACKOFF_MAX_DELAY};

/// Jitter bounds: the computed delay is scaled by a uniform factor in
/// `[1 - JITTER_RATIO, 1 + JITTER_RATIO]`.
const JITTER_RATIO: f64 = 0.2;

/// Classification of download failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,

    /// Failure that won't succeed regardless of retries.
    Permanent,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// The attempt number about to run (1-indexed).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Exponential backoff shape: base delay and cap.
///
/// The attempt budget is not part of the policy; it comes from the request
/// and is passed to [`should_retry`](Self::should_retry) so one policy can
/// serve requests with different retry counts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: BACKOFF_BASE_DELAY,
            max_delay: BACKOFF_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with a custom base delay and cap.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Pure backoff delay for a 1-indexed attempt, without jitter:
    /// `min(cap, base * 2^(attempt-1))`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        // Exponent capped well past the point where the cap dominates,
        // so the shift cannot overflow.
        let exponent = attempt.saturating_sub(1).min(20);
        let factor = 2u32.saturating_pow(exponent);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff delay with multiplicative jitter in `[0.8, 1.2]`.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let factor = rand::thread_rng().gen_range(1.0 - JITTER_RATIO..=1.0 + JITTER_RATIO);
        self.backoff_delay(attempt).mul_f64(factor)
    }

    /// Determines whether the attempt that just failed should be retried.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    /// * `max_attempts` - Total attempt budget (initial attempt + retries)
    pub fn should_retry(
        &self,
        failure_type: FailureType,
        attempt: u32,
        max_attempts: u32,
    ) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= max_attempts {
            debug!(attempt, max = max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({max_attempts}) exhausted"),
            };
        }

        let delay = self.delay_with_jitter(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }
}

/// Classifies a download error for retry decisions.
///
/// # HTTP Status Code Classification
///
/// | Status | Type | Rationale |
/// |--------|------|-----------|
/// | 408 | Transient | Request timeout - may succeed |
/// | 429 | Transient | Rate limited - backs off like any transient |
/// | other 4xx | Permanent | The resource will not appear by retrying |
/// | 5xx | Transient | Server error - may be temporary |
///
/// # Non-HTTP Errors
///
/// | Error | Type | Rationale |
/// |-------|------|-----------|
/// | Timeout | Transient | Network may recover |
/// | Network (most) | Transient | Server may come back |
/// | Network (TLS) | Permanent | Certificate/config issue |
/// | TooManyRedirects | Permanent | The chain won't shorten itself |
/// | Io | Permanent | Local disk errors don't self-heal |
/// | HashMismatch | Transient | Transient corruption is plausible once |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),

        DownloadError::Timeout { .. } => FailureType::Transient,

        DownloadError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }

        // Repeated mismatches become terminal in the orchestrator once the
        // attempt budget runs out.
        DownloadError::HashMismatch { .. } => FailureType::Transient,

        DownloadError::TooManyRedirects { .. }
        | DownloadError::Io { .. }
        | DownloadError::InvalidPath { .. }
        | DownloadError::InvalidRequest { .. }
        | DownloadError::AlreadyExists { .. }
        | DownloadError::RetriesExhausted { .. }
        | DownloadError::Cancelled => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code into a failure type.
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 | 429 => FailureType::Transient,
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        // Anything else is unexpected, treat as permanent
        _ => FailureType::Permanent,
    }
}

/// Checks if a reqwest error is a TLS/certificate error.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}
