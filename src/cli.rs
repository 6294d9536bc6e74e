//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use modelfetch::fetch::constants::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};

/// Fetch a model file over HTTP(S) into a managed directory tree.
///
/// The file is streamed to a temporary path, verified, and installed
/// atomically: the destination is never observable in a half-written state.
#[derive(Parser, Debug)]
#[command(name = "modelfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Source URL (http or https)
    pub url: String,

    /// Base content directory that downloads must stay within
    #[arg(short = 'd', long, default_value = "models")]
    pub base_dir: PathBuf,

    /// Subfolder under the base directory (nested OK, e.g. "controlnet/myset")
    #[arg(short, long, default_value = "checkpoints")]
    pub subfolder: String,

    /// Destination filename; derived from the URL when omitted
    #[arg(short, long)]
    pub filename: Option<String>,

    /// Keep an existing destination file instead of replacing it
    #[arg(long)]
    pub no_overwrite: bool,

    /// Expected SHA-256 digest (64 hex chars) for integrity verification
    #[arg(long)]
    pub sha256: Option<String>,

    /// Network timeout per attempt in seconds
    #[arg(short = 't', long, default_value_t = DEFAULT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=86400))]
    pub timeout_secs: u64,

    /// Maximum retry attempts for transient failures (0-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: u32,

    /// Override the User-Agent header
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
