//! HTTP(S) download engine with retries, streaming verification, and
//! atomic installs.
//!
//! Fetches a single file into a managed directory tree, guaranteeing that
//! the destination is either absent/unchanged or a fully verified,
//! byte-correct copy of the remote resource — never a partial artifact,
//! even across network failures or interruption.
//!
//! # Features
//!
//! - Path sandboxing: the destination always stays under the base directory
//! - Streaming transfers with an incrementally computed SHA-256
//! - Exponential backoff with jitter for transient failures
//! - Atomic install via same-directory temp file + rename
//! - External cancellation via `CancellationToken`
//!
//! # Example
//!
//! ```no_run
//! use modelfetch::{DownloadEngine, DownloadRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let request = DownloadRequest::builder(
//!     "https://example.com/models/model.safetensors",
//!     "./models",
//! )
//! .subfolder("checkpoints")
//! .build()?;
//!
//! let engine = DownloadEngine::new();
//! let outcome = engine.download(&request).await?;
//! println!("Installed: {}", outcome.path.display());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod install;
mod path;
mod request;
mod retry;
mod verify;

pub use client::HttpClient;
pub use engine::{DownloadEngine, DownloadOutcome};
pub use error::DownloadError;
pub use path::ResolvedTarget;
pub use request::{DownloadRequest, DownloadRequestBuilder, ProgressObserver, ProgressUpdate};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error};

// Note: no module-local Result alias; use `Result<T, DownloadError>`
// explicitly in function signatures.
