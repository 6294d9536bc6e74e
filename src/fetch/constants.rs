//! Constants for the download engine (timeouts, retry shape, install retry).

use std::time::Duration;

/// Default per-attempt timeout (connect + read + total), in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default maximum retry attempts after the initial one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// HTTP connect timeout (30 seconds), independent of the per-attempt total.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Maximum redirect hops followed before the attempt fails.
pub const MAX_REDIRECT_HOPS: usize = 5;

/// Base delay for exponential backoff (1 second).
pub const BACKOFF_BASE_DELAY: Duration = Duration::from_secs(1);

/// Backoff delay cap (30 seconds).
pub const BACKOFF_MAX_DELAY: Duration = Duration::from_secs(30);

/// Length of the random token in temporary-file names.
pub const TEMP_TOKEN_LEN: usize = 8;

/// Attempts to finalize a rename past transient file locks (AV scanners).
pub const RENAME_RETRY_MAX: u32 = 30;

/// Sleep between rename attempts while a transient lock clears.
pub const RENAME_RETRY_SLEEP: Duration = Duration::from_millis(250);
