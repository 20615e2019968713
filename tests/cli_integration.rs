//! CLI integration tests
//!
//! These tests verify the command-line surface of the built binary:
//! argument parsing, help output, and the early fatal paths that abort
//! before any tool runs or service launches.

use std::env;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Helper to get the path to the stackup binary
fn stackup_bin() -> PathBuf {
    // In tests, the binary should be at target/debug/stackup
    let mut path = env::current_exe()
        .expect("Failed to get current executable path")
        .parent()
        .expect("No parent")
        .parent()
        .expect("No parent")
        .to_path_buf();

    // If we're in deps/, go up one more level
    if path.ends_with("deps") {
        path = path.parent().expect("No parent").to_path_buf();
    }

    path.join("stackup")
}

#[test]
fn test_cli_help() {
    let output = Command::new(stackup_bin())
        .arg("--help")
        .output()
        .expect("Failed to execute stackup");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("stackup"));
    assert!(stdout.contains("--skip-extractor"));
    assert!(stdout.contains("--stack-root"));
    assert!(stdout.contains("PDF"));
}

#[test]
fn test_cli_version() {
    let output = Command::new(stackup_bin())
        .arg("--version")
        .output()
        .expect("Failed to execute stackup");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("stackup"));
}

#[test]
fn test_missing_input_argument_fails() {
    let output = Command::new(stackup_bin())
        .output()
        .expect("Failed to execute stackup");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("PDF") || stderr.contains("required"));
}

#[test]
fn test_nonexistent_input_exits_nonzero_before_launching() {
    let dir = TempDir::new().expect("tempdir");

    let output = Command::new(stackup_bin())
        .arg("--stack-root")
        .arg(dir.path())
        .arg(dir.path().join("does-not-exist.pdf"))
        .output()
        .expect("Failed to execute stackup");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("input document not found"));
    // The run aborted before any service launched.
    assert!(!dir.path().join("java.log").exists());
    assert!(!dir.path().join("python-server/python.log").exists());
}

#[test]
fn test_conflicting_verbosity_flags_rejected() {
    let output = Command::new(stackup_bin())
        .args(["-v", "-q", "input.pdf"])
        .output()
        .expect("Failed to execute stackup");

    assert!(!output.status.success());
}
