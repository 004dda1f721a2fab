//! Integration tests for the backend process lifecycle.
//!
//! These spawn real Unix commands (`true`, `false`, `sh`) and are gated on
//! `cfg(unix)` — the proxy relies on Unix signal and process-group semantics.
#![cfg(unix)]

use std::time::Duration;

use notion_guard::config::GuardConfig;
use notion_guard::error::GuardError;
use notion_guard::proxy::run_proxy;

fn test_config(dir: &tempfile::TempDir) -> GuardConfig {
    GuardConfig {
        log_to_file: false,
        log_dir: dir.path().to_path_buf(),
        batch_delay: Duration::from_millis(1),
        ..GuardConfig::default()
    }
}

/// Backend exits cleanly: the guard's exit code mirrors it.
#[tokio::test(flavor = "multi_thread")]
async fn test_clean_exit_code_propagated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let code = run_proxy(test_config(&dir), "true".to_string(), vec![])
        .await
        .expect("proxy run");
    assert_eq!(code, 0);
}

/// Backend crashes immediately: the non-zero code comes back unchanged.
#[tokio::test(flavor = "multi_thread")]
async fn test_crash_exit_code_propagated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let code = run_proxy(test_config(&dir), "false".to_string(), vec![])
        .await
        .expect("proxy run");
    assert_eq!(code, 1);
}

/// Backend emits output and exits with a chosen code.
#[tokio::test(flavor = "multi_thread")]
async fn test_arbitrary_exit_code_propagated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let code = run_proxy(
        test_config(&dir),
        "sh".to_string(),
        vec!["-c".to_string(), "exit 42".to_string()],
    )
    .await
    .expect("proxy run");
    assert_eq!(code, 42);
}

/// Spawn failure is fatal — the guard never runs ungoverned.
#[tokio::test(flavor = "multi_thread")]
async fn test_spawn_failure_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = run_proxy(
        test_config(&dir),
        "nonexistent-command-that-does-not-exist-12345".to_string(),
        vec![],
    )
    .await;

    match result {
        Err(GuardError::BackendSpawn { command, .. }) => {
            assert_eq!(command, "nonexistent-command-that-does-not-exist-12345");
        }
        other => panic!("expected BackendSpawn error, got: {other:?}"),
    }
}

/// The log directory is created on startup when file logging is enabled.
#[tokio::test(flavor = "multi_thread")]
async fn test_log_dir_created_when_file_logging() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_dir = dir.path().join("nested").join("logs");
    let config = GuardConfig {
        log_to_file: true,
        log_dir: log_dir.clone(),
        ..GuardConfig::default()
    };

    let code = run_proxy(config, "true".to_string(), vec![])
        .await
        .expect("proxy run");
    assert_eq!(code, 0);
    assert!(log_dir.is_dir(), "log directory should have been created");
}
