//! CLI entry point for the modelfetch tool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use modelfetch::{DownloadEngine, DownloadRequest, ProgressObserver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    // Ctrl-C cancels the in-flight download, including backoff sleeps
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling download");
                cancel.cancel();
            }
        });
    }

    let bar = (!args.quiet).then(progress_bar);

    let mut builder = DownloadRequest::builder(&args.url, &args.base_dir)
        .subfolder(&args.subfolder)
        .overwrite(!args.no_overwrite)
        .timeout(Duration::from_secs(args.timeout_secs))
        .max_retries(args.max_retries);
    if let Some(filename) = &args.filename {
        builder = builder.filename(filename);
    }
    if let Some(digest) = &args.sha256 {
        builder = builder.expected_sha256(digest);
    }
    if let Some(user_agent) = &args.user_agent {
        builder = builder.user_agent(user_agent);
    }
    if let Some(bar) = &bar {
        let bar = bar.clone();
        let observer: ProgressObserver = Arc::new(move |update: &modelfetch::ProgressUpdate| {
            if let Some(total) = update.total_bytes {
                bar.set_length(total);
            }
            bar.set_position(update.bytes_transferred);
        });
        builder = builder.observer(observer);
    }
    let request = builder.build()?;

    let engine = DownloadEngine::new();
    let result = engine.download_cancellable(&request, &cancel).await;

    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    let outcome = result?;
    info!(
        bytes = outcome.bytes_downloaded,
        attempts = outcome.attempts,
        sha256 = %outcome.sha256,
        "download complete"
    );

    // The installed path is the tool's one machine-consumable output
    println!("{}", outcome.path.display());

    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {elapsed})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
