//! Integration tests for the download engine.
//!
//! Full engine flow against mock HTTP servers: retry/backoff behavior,
//! path sandboxing, integrity verification, and the atomic-install
//! guarantees at the destination path.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use modelfetch::{DownloadEngine, DownloadError, DownloadRequest, ProgressObserver, RetryPolicy};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONTENT: &[u8] = b"model weights: stable bytes for hashing across the whole test suite";

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Engine with millisecond backoff so retry tests stay fast.
fn fast_engine() -> DownloadEngine {
    DownloadEngine::with_policy(RetryPolicy::new(
        Duration::from_millis(10),
        Duration::from_millis(50),
    ))
}

fn request_for(url: &str, base: &Path) -> DownloadRequest {
    DownloadRequest::builder(url, base)
        .subfolder("checkpoints")
        .build()
        .expect("request should build")
}

/// Any `.part` files left under the base directory.
fn leftover_temp_files(base: &Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![base.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let p = entry.path();
            if p.is_dir() {
                stack.push(p);
            } else if p.extension().is_some_and(|ext| ext == "part") {
                found.push(p);
            }
        }
    }
    found
}

#[tokio::test]
async fn test_success_streams_verifies_and_installs() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/model.safetensors"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONTENT.to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/model.safetensors", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("checkpoints")
        .expected_sha256(sha256_hex(CONTENT))
        .build()
        .expect("request should build");

    let outcome = fast_engine()
        .download(&request)
        .await
        .expect("download should succeed");

    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.bytes_downloaded, CONTENT.len() as u64);
    assert_eq!(outcome.sha256, sha256_hex(CONTENT));
    assert!(outcome.path.ends_with("checkpoints/model.safetensors"));
    assert_eq!(std::fs::read(&outcome.path).expect("read"), CONTENT);
    assert!(leftover_temp_files(base.path()).is_empty());
}

#[tokio::test]
async fn test_repeated_invocations_produce_identical_content() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/model.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONTENT.to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/model.bin", server.uri());
    let engine = fast_engine();

    let first = engine
        .download(&request_for(&url, base.path()))
        .await
        .expect("first download");
    let second = engine
        .download(&request_for(&url, base.path()))
        .await
        .expect("second download");

    assert_eq!(first.path, second.path);
    assert_eq!(first.sha256, second.sha256);
    assert_eq!(std::fs::read(&second.path).expect("read"), CONTENT);
}

#[tokio::test]
async fn test_traversal_subfolder_rejected_without_network_or_writes() {
    let server = MockServer::start().await;
    let outer = TempDir::new().expect("temp dir");
    let base = outer.path().join("base");
    std::fs::create_dir_all(&base).expect("mkdir");

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONTENT.to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let url = format!("{}/model.bin", server.uri());
    let request = DownloadRequest::builder(&url, &base)
        .subfolder("../../etc")
        .build()
        .expect("request should build");

    let result = fast_engine().download(&request).await;

    assert!(
        matches!(result, Err(DownloadError::InvalidPath { .. })),
        "expected InvalidPath, got: {result:?}"
    );
    // Nothing may appear outside the base directory
    assert!(!outer.path().join("etc").exists());
}

#[tokio::test]
async fn test_transient_5xx_then_success_counts_attempts() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    // First three attempts hit 503; the fourth gets the file
    Mock::given(method("GET"))
        .and(path("/flaky.bin"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONTENT.to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/flaky.bin", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("checkpoints")
        .expected_sha256(sha256_hex(CONTENT))
        .max_retries(3)
        .build()
        .expect("request should build");

    let outcome = fast_engine()
        .download(&request)
        .await
        .expect("download should succeed on the last attempt");

    assert_eq!(outcome.attempts, 4);
    assert_eq!(std::fs::read(&outcome.path).expect("read"), CONTENT);
    assert!(leftover_temp_files(base.path()).is_empty());
}

#[tokio::test]
async fn test_fatal_404_is_not_retried() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/missing.bin"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/missing.bin", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("checkpoints")
        .max_retries(5)
        .build()
        .expect("request should build");

    let result = fast_engine().download(&request).await;

    match result {
        Err(DownloadError::HttpStatus { status: 404, .. }) => {}
        other => panic!("Expected HttpStatus 404, got: {other:?}"),
    }
    assert!(leftover_temp_files(base.path()).is_empty());
}

#[tokio::test]
async fn test_persistent_5xx_exhausts_retries() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/down.bin"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let url = format!("{}/down.bin", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("checkpoints")
        .max_retries(1)
        .build()
        .expect("request should build");

    let result = fast_engine().download(&request).await;

    match result {
        Err(DownloadError::RetriesExhausted {
            attempts, source, ..
        }) => {
            assert_eq!(attempts, 2);
            assert!(matches!(
                *source,
                DownloadError::HttpStatus { status: 500, .. }
            ));
        }
        other => panic!("Expected RetriesExhausted, got: {other:?}"),
    }
    assert!(!base.path().join("checkpoints").join("down.bin").exists());
    assert!(leftover_temp_files(base.path()).is_empty());
}

#[tokio::test]
async fn test_persistent_hash_mismatch_is_terminal_and_clean() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/model.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONTENT.to_vec()))
        .expect(3)
        .mount(&server)
        .await;

    let url = format!("{}/model.bin", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("checkpoints")
        .expected_sha256(sha256_hex(b"different content entirely"))
        .max_retries(2)
        .build()
        .expect("request should build");

    let result = fast_engine().download(&request).await;

    match result {
        Err(DownloadError::HashMismatch {
            attempts, actual, ..
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(actual, sha256_hex(CONTENT));
        }
        other => panic!("Expected HashMismatch, got: {other:?}"),
    }
    assert!(!base.path().join("checkpoints").join("model.bin").exists());
    assert!(leftover_temp_files(base.path()).is_empty());
}

#[tokio::test]
async fn test_hash_mismatch_leaves_prior_file_untouched() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    let dest_dir = base.path().join("checkpoints");
    std::fs::create_dir_all(&dest_dir).expect("mkdir");
    std::fs::write(dest_dir.join("model.bin"), b"previously installed").expect("seed file");

    Mock::given(method("GET"))
        .and(path("/model.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONTENT.to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/model.bin", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("checkpoints")
        .expected_sha256(sha256_hex(b"something else"))
        .max_retries(1)
        .build()
        .expect("request should build");

    let result = fast_engine().download(&request).await;

    assert!(matches!(result, Err(DownloadError::HashMismatch { .. })));
    // The unverified download never replaced the existing file
    assert_eq!(
        std::fs::read(dest_dir.join("model.bin")).expect("read"),
        b"previously installed"
    );
}

#[tokio::test]
async fn test_already_exists_without_overwrite_is_untouched() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    let dest_dir = base.path().join("checkpoints");
    std::fs::create_dir_all(&dest_dir).expect("mkdir");
    std::fs::write(dest_dir.join("model.bin"), b"precious bytes").expect("seed file");

    // The engine must not even contact the server
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONTENT.to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let url = format!("{}/model.bin", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("checkpoints")
        .overwrite(false)
        .build()
        .expect("request should build");

    let result = fast_engine().download(&request).await;

    assert!(
        matches!(result, Err(DownloadError::AlreadyExists { .. })),
        "expected AlreadyExists, got: {result:?}"
    );
    assert_eq!(
        std::fs::read(dest_dir.join("model.bin")).expect("read"),
        b"precious bytes"
    );
}

#[tokio::test]
async fn test_overwrite_replaces_existing_file() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    let dest_dir = base.path().join("checkpoints");
    std::fs::create_dir_all(&dest_dir).expect("mkdir");
    std::fs::write(dest_dir.join("model.bin"), b"stale").expect("seed file");

    Mock::given(method("GET"))
        .and(path("/model.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONTENT.to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/model.bin", server.uri());
    let outcome = fast_engine()
        .download(&request_for(&url, base.path()))
        .await
        .expect("download should succeed");

    assert_eq!(std::fs::read(&outcome.path).expect("read"), CONTENT);
}

#[tokio::test]
async fn test_orphaned_temp_from_interrupted_run_does_not_corrupt() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    // Simulate a process killed after fully writing its temp file but
    // before the rename: a stale uniquely-suffixed .part file remains.
    let dest_dir = base.path().join("checkpoints");
    std::fs::create_dir_all(&dest_dir).expect("mkdir");
    std::fs::write(dest_dir.join(".model.bin.deadbeef.part"), CONTENT).expect("orphan");

    Mock::given(method("GET"))
        .and(path("/model.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONTENT.to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/model.bin", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("checkpoints")
        .expected_sha256(sha256_hex(CONTENT))
        .build()
        .expect("request should build");

    let outcome = fast_engine()
        .download(&request)
        .await
        .expect("re-invocation should succeed");

    // Whenever the final path exists post-install, its hash matches
    let installed = std::fs::read(&outcome.path).expect("read");
    assert_eq!(sha256_hex(&installed), sha256_hex(CONTENT));
}

#[tokio::test]
async fn test_cancellation_during_backoff_sleep() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/down.bin"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let url = format!("{}/down.bin", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("checkpoints")
        .max_retries(3)
        .build()
        .expect("request should build");

    // Default policy: first backoff is ~1s, cancel well before it elapses
    let engine = DownloadEngine::new();
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        });
    }

    let started = Instant::now();
    let result = engine.download_cancellable(&request, &cancel).await;

    assert!(
        matches!(result, Err(DownloadError::Cancelled)),
        "expected Cancelled, got: {result:?}"
    );
    assert!(
        started.elapsed() < Duration::from_millis(900),
        "cancellation must interrupt the backoff sleep, took {:?}",
        started.elapsed()
    );
    assert!(leftover_temp_files(base.path()).is_empty());
}

#[tokio::test]
async fn test_pre_cancelled_token_fails_fast() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/model.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONTENT.to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/model.bin", server.uri());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = fast_engine()
        .download_cancellable(&request_for(&url, base.path()), &cancel)
        .await;

    assert!(matches!(result, Err(DownloadError::Cancelled)));
    assert!(leftover_temp_files(base.path()).is_empty());
}

#[tokio::test]
async fn test_progress_observer_sees_full_transfer() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");
    let body = vec![42u8; 256 * 1024];

    Mock::given(method("GET"))
        .and(path("/big.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let calls = Arc::new(AtomicU64::new(0));
    let last_bytes = Arc::new(AtomicU64::new(0));
    let observer: ProgressObserver = {
        let calls = Arc::clone(&calls);
        let last_bytes = Arc::clone(&last_bytes);
        Arc::new(move |update: &modelfetch::ProgressUpdate| {
            calls.fetch_add(1, Ordering::SeqCst);
            last_bytes.store(update.bytes_transferred, Ordering::SeqCst);
            assert_eq!(update.total_bytes, Some(262_144));
        })
    };

    let url = format!("{}/big.bin", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("checkpoints")
        .observer(observer)
        .build()
        .expect("request should build");

    let outcome = fast_engine()
        .download(&request)
        .await
        .expect("download should succeed");

    assert!(calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(last_bytes.load(Ordering::SeqCst), body.len() as u64);
    assert_eq!(outcome.bytes_downloaded, body.len() as u64);
}

#[tokio::test]
async fn test_timeout_is_retried_then_exhausted() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(CONTENT.to_vec())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let url = format!("{}/slow.bin", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("checkpoints")
        .timeout(Duration::from_millis(150))
        .max_retries(1)
        .build()
        .expect("request should build");

    let result = fast_engine().download(&request).await;

    match result {
        Err(DownloadError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("Expected RetriesExhausted, got: {other:?}"),
    }
    assert!(leftover_temp_files(base.path()).is_empty());
}

#[tokio::test]
async fn test_uppercase_expected_digest_verifies() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/model.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONTENT.to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/model.bin", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("checkpoints")
        .expected_sha256(sha256_hex(CONTENT).to_uppercase())
        .build()
        .expect("request should build");

    let outcome = fast_engine().download(&request).await;
    assert!(outcome.is_ok(), "expected Ok, got: {outcome:?}");
}

#[tokio::test]
async fn test_nested_subfolder_creates_tree_and_installs() {
    let server = MockServer::start().await;
    let base = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/m.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONTENT.to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/m.bin", server.uri());
    let request = DownloadRequest::builder(&url, base.path())
        .subfolder("controlnet/myset")
        .build()
        .expect("request should build");

    let outcome = fast_engine()
        .download(&request)
        .await
        .expect("download should succeed");

    assert!(outcome.path.ends_with("controlnet/myset/m.bin"));
    assert_eq!(std::fs::read(&outcome.path).expect("read"), CONTENT);
}
