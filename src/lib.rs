//! modelfetch core library
//!
//! Fetches model files from HTTP(S) URLs into a managed local directory
//! tree. The destination file is guaranteed to be either absent/unchanged
//! or a fully verified, byte-correct copy of the remote resource — never a
//! partial or corrupted artifact.
//!
//! # Architecture
//!
//! - [`fetch`] - download engine: path sandboxing, retrying streaming
//!   transfer with SHA-256 verification, atomic install
//! - [`wildcard`] - standalone `{a|b|c}` alternative-group expansion

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fetch;
mod user_agent;
pub mod wildcard;

// Re-export commonly used types
pub use fetch::{
    DownloadEngine, DownloadError, DownloadOutcome, DownloadRequest, DownloadRequestBuilder,
    FailureType, HttpClient, ProgressObserver, ProgressUpdate, ResolvedTarget, RetryDecision,
    RetryPolicy, classify_error,
};
