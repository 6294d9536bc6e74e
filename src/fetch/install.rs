//! Atomic installation of a verified temporary file.
//!
//! The rename happens within one directory, so at every instant the final
//! path is observable either as the prior file (if any) or the new, fully
//! verified file. Cross-filesystem renames are not supported; the resolver
//! placing the temp file next to the destination makes them unreachable in
//! normal operation.

use std::io::ErrorKind;

use tracing::{debug, warn};

use super::constants::{RENAME_RETRY_MAX, RENAME_RETRY_SLEEP};
use super::error::DownloadError;
use super::path::ResolvedTarget;

/// Promotes the verified temporary file onto the final path.
///
/// `PermissionDenied` from the rename is treated as a transient lock
/// (antivirus or indexer holding the file on some platforms) and retried a
/// bounded number of times before giving up.
///
/// # Errors
///
/// Returns [`DownloadError::AlreadyExists`] when the final path is occupied
/// and `overwrite` is false; the temporary file is deleted and the existing
/// file untouched. Returns [`DownloadError::Io`] when the rename fails; in
/// that case the verified temporary file is preserved at its path so the
/// caller can inspect it or retry installation without re-downloading.
pub(crate) async fn install(target: &ResolvedTarget, overwrite: bool) -> Result<(), DownloadError> {
    if !overwrite && tokio::fs::try_exists(&target.final_path).await.unwrap_or(false) {
        let _ = tokio::fs::remove_file(&target.temp_path).await;
        return Err(DownloadError::already_exists(target.final_path.clone()));
    }

    let mut attempts = 0u32;
    loop {
        match tokio::fs::rename(&target.temp_path, &target.final_path).await {
            Ok(()) => {
                debug!(path = %target.final_path.display(), "installed");
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied && attempts < RENAME_RETRY_MAX => {
                attempts += 1;
                warn!(
                    path = %target.final_path.display(),
                    attempts,
                    "rename blocked by a transient lock, retrying"
                );
                tokio::time::sleep(RENAME_RETRY_SLEEP).await;
            }
            // Temp file intentionally left in place for inspection/reinstall
            Err(e) => return Err(DownloadError::io(target.final_path.clone(), e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::Path;

    use tempfile::TempDir;

    fn target_in(dir: &Path, name: &str, already_exists: bool) -> ResolvedTarget {
        ResolvedTarget {
            final_path: dir.join(name),
            temp_path: dir.join(format!(".{name}.t0ken123.part")),
            already_exists,
        }
    }

    #[tokio::test]
    async fn test_install_renames_temp_onto_final_path() {
        let dir = TempDir::new().unwrap();
        let target = target_in(dir.path(), "model.bin", false);
        tokio::fs::write(&target.temp_path, b"verified bytes")
            .await
            .unwrap();

        install(&target, true).await.unwrap();

        assert_eq!(
            std::fs::read(&target.final_path).unwrap(),
            b"verified bytes"
        );
        assert!(!target.temp_path.exists());
    }

    #[tokio::test]
    async fn test_install_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let target = target_in(dir.path(), "model.bin", true);
        std::fs::write(&target.final_path, b"old").unwrap();
        tokio::fs::write(&target.temp_path, b"new").await.unwrap();

        install(&target, true).await.unwrap();

        assert_eq!(std::fs::read(&target.final_path).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_install_refuses_overwrite_and_deletes_temp() {
        let dir = TempDir::new().unwrap();
        let target = target_in(dir.path(), "model.bin", true);
        std::fs::write(&target.final_path, b"precious").unwrap();
        tokio::fs::write(&target.temp_path, b"new").await.unwrap();

        let result = install(&target, false).await;

        assert!(matches!(result, Err(DownloadError::AlreadyExists { .. })));
        assert_eq!(std::fs::read(&target.final_path).unwrap(), b"precious");
        assert!(!target.temp_path.exists());
    }

    #[tokio::test]
    async fn test_install_missing_temp_preserves_nothing_but_errors() {
        let dir = TempDir::new().unwrap();
        let target = target_in(dir.path(), "model.bin", false);

        let result = install(&target, true).await;

        assert!(matches!(result, Err(DownloadError::Io { .. })));
        assert!(!target.final_path.exists());
    }
}
