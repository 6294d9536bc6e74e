//! Integrity verification of a completed transfer.
//!
//! The digest is accumulated while streaming (see
//! [`client`](super::client)); this module only compares it against the
//! expectation. A mismatch is constructed as a retryable error here and
//! becomes terminal in the orchestrator once the attempt budget runs out.

use tracing::debug;

use super::error::DownloadError;

/// Compares the computed digest against the optional expected digest.
///
/// No expected digest means no verification was requested. The compare is
/// case-insensitive; expected digests are normalized to lowercase at
/// request build time, and computed digests are rendered lowercase, but a
/// caller going through this function directly gets the same tolerance.
///
/// # Errors
///
/// Returns [`DownloadError::HashMismatch`] carrying the given attempt
/// number when the digests differ.
pub(crate) fn verify_digest(
    actual: &str,
    expected: Option<&str>,
    attempt: u32,
) -> Result<(), DownloadError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    if actual.eq_ignore_ascii_case(expected) {
        debug!(digest = %actual, "SHA-256 verified");
        Ok(())
    } else {
        Err(DownloadError::hash_mismatch(
            expected.to_ascii_lowercase(),
            actual.to_ascii_lowercase(),
            attempt,
        ))
    }
}
