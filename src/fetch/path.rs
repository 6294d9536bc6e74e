//! Destination path resolution and sandboxing.
//!
//! Maps a (base directory, subfolder, optional filename) triple plus the
//! source URL to a [`ResolvedTarget`]: the absolute final path, a uniquely
//! suffixed temporary path in the same directory (required for the atomic
//! rename), and whether the final path is already occupied.
//!
//! The resolved path must stay inside the base directory. Traversal
//! segments and absolute subfolders are rejected outright rather than
//! silently stripped, and the containment is re-checked against the
//! canonicalized directories after creation so symlinks can't smuggle the
//! destination out of the tree.

use std::path::{Path, PathBuf};

use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::debug;
use url::Url;

use super::constants::TEMP_TOKEN_LEN;
use super::error::DownloadError;

/// Resolved download destination, produced once per invocation and
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// Absolute path the verified file will be installed at.
    pub final_path: PathBuf,
    /// Uniquely suffixed temporary path in the same parent directory.
    pub temp_path: PathBuf,
    /// Whether a file already occupied `final_path` at resolve time.
    pub already_exists: bool,
}

/// Resolves the destination for a download, creating the parent directory
/// tree as a side effect.
///
/// # Errors
///
/// Returns [`DownloadError::InvalidPath`] when the subfolder is absolute or
/// contains `..`, when the filename (explicit or URL-derived) is empty or
/// contains a path separator, or when the resolved path escapes the base
/// directory. Returns [`DownloadError::Io`] when directory creation fails.
pub(crate) async fn resolve_target(
    base_dir: &Path,
    subfolder: &str,
    filename: Option<&str>,
    url: &Url,
) -> Result<ResolvedTarget, DownloadError> {
    let segments = safe_subfolder_segments(subfolder)?;
    let fname = safe_filename(filename, url)?;

    let mut parent = base_dir.to_path_buf();
    for segment in &segments {
        parent.push(segment);
    }

    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| DownloadError::io(parent.clone(), e))?;

    // Containment check against the real directories: create_dir_all above
    // guarantees both exist, and canonicalizing resolves any symlinks a
    // sanitized segment might still have traversed.
    let canon_base = tokio::fs::canonicalize(base_dir)
        .await
        .map_err(|e| DownloadError::io(base_dir.to_path_buf(), e))?;
    let canon_parent = tokio::fs::canonicalize(&parent)
        .await
        .map_err(|e| DownloadError::io(parent.clone(), e))?;
    if !canon_parent.starts_with(&canon_base) {
        return Err(DownloadError::invalid_path(format!(
            "subfolder '{subfolder}' resolves outside the base directory"
        )));
    }

    let final_path = canon_parent.join(&fname);
    let temp_path = canon_parent.join(format!(".{fname}.{}.part", temp_token()));
    let already_exists = tokio::fs::try_exists(&final_path).await.unwrap_or(false);

    debug!(
        final_path = %final_path.display(),
        temp_path = %temp_path.display(),
        already_exists,
        "resolved download target"
    );

    Ok(ResolvedTarget {
        final_path,
        temp_path,
        already_exists,
    })
}

/// Splits and sanitizes the subfolder into safe path segments.
fn safe_subfolder_segments(subfolder: &str) -> Result<Vec<String>, DownloadError> {
    let trimmed = subfolder.trim();
    if trimmed.starts_with('/') || trimmed.starts_with('\\') {
        return Err(DownloadError::invalid_path(format!(
            "subfolder '{subfolder}' must be relative to the base directory"
        )));
    }

    let mut segments = Vec::new();
    for raw in trimmed.split(['/', '\\']) {
        match raw {
            "" | "." => {}
            ".." => {
                return Err(DownloadError::invalid_path(format!(
                    "subfolder '{subfolder}' contains a parent-directory segment"
                )));
            }
            segment => segments.push(sanitize_component(segment)),
        }
    }
    Ok(segments)
}

/// Picks the destination filename: the explicit one when given, otherwise
/// the URL's last path segment after percent-decoding.
fn safe_filename(filename: Option<&str>, url: &Url) -> Result<String, DownloadError> {
    let candidate = match filename.map(str::trim).filter(|name| !name.is_empty()) {
        Some(explicit) => explicit.to_string(),
        None => {
            let last = url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .unwrap_or("");
            let decoded = urlencoding::decode(last).unwrap_or_else(|e| {
                debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
                last.into()
            });
            if decoded.is_empty() {
                return Err(DownloadError::invalid_path(format!(
                    "URL '{url}' has no filename segment; supply one explicitly"
                )));
            }
            decoded.into_owned()
        }
    };

    if candidate.contains('/') || candidate.contains('\\') {
        return Err(DownloadError::invalid_path(format!(
            "filename '{candidate}' contains a path separator"
        )));
    }

    Ok(sanitize_component(&candidate))
}

/// Sanitizes one path component to `[A-Za-z0-9._-]`, collapsing runs of
/// other characters to a single `_` and trimming `.`/`_` from the ends.
/// A component with nothing left becomes `_`.
fn sanitize_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
            prev_sep = false;
        } else if !prev_sep {
            out.push('_');
            prev_sep = true;
        }
    }
    let trimmed = out.trim_matches(['.', '_']).to_string();
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed
    }
}

/// Random alphanumeric token for temporary-file uniqueness.
fn temp_token() -> String {
    rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(TEMP_TOKEN_LEN)
        .map(char::from)
        .collect()
}
