//! Verdict markers left by the `netsweep` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use netsweep::results::{FAILED_MARKER, SUCCESS_MARKER};
use tempfile::TempDir;

const SUITE: &str = r#"
@GENERAL@
topologies:
  pair:
    type: linear
    nodes: 2
protocols:
  tcp: { program: tcp-echo, startup_delay: 0s }
tools:
  ping:
    client: { program: ping, args: ["{server_ip}"] }
    duration: 50ms
tests:
  smoke:
    topology: pair
    tools: [ping]
    protocols: [tcp]
"#;

const INVALID_GENERAL: &str = "general:\n  isolation:\n    ports_per_context: 1\n";

fn write_suite(dir: &Path, name: &str, general: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, SUITE.replace("@GENERAL@", general)).unwrap();
    path
}

fn netsweep(suite: &Path, workspace: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_netsweep"))
        .arg("--config")
        .arg(suite)
        .arg("--workspace")
        .arg(workspace)
        .args(extra)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn markers(workspace: &Path) -> (bool, bool) {
    let root = workspace.join("test_results");
    (root.join(SUCCESS_MARKER).exists(), root.join(FAILED_MARKER).exists())
}

#[test]
fn test_passing_suite_leaves_success_marker() {
    let dir = TempDir::new().unwrap();
    let workspace = dir.path().join("ws");
    let suite = write_suite(dir.path(), "suite.yaml", "");

    let output = netsweep(&suite, &workspace, &[]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(markers(&workspace), (true, false));
    assert!(workspace.join("test_results/smoke/summary.json").is_file());
}

#[test]
fn test_invalid_general_replaces_stale_success() {
    let dir = TempDir::new().unwrap();
    let workspace = dir.path().join("ws");

    let valid = write_suite(dir.path(), "valid.yaml", "");
    assert!(netsweep(&valid, &workspace, &[]).status.success());
    assert_eq!(markers(&workspace), (true, false));

    let invalid = write_suite(dir.path(), "invalid.yaml", INVALID_GENERAL);
    let output = netsweep(&invalid, &workspace, &[]);
    assert!(!output.status.success());
    assert_eq!(markers(&workspace), (false, true));
}

#[test]
fn test_unknown_test_case_fails() {
    let dir = TempDir::new().unwrap();
    let workspace = dir.path().join("ws");
    let suite = write_suite(dir.path(), "suite.yaml", "");

    assert!(netsweep(&suite, &workspace, &[]).status.success());
    let output = netsweep(&suite, &workspace, &["--test", "missing"]);
    assert!(!output.status.success());
    assert_eq!(markers(&workspace), (false, true));
}

#[test]
fn test_unreadable_suite_fails() {
    let dir = TempDir::new().unwrap();
    let workspace = dir.path().join("ws");

    let output = netsweep(&dir.path().join("absent.yaml"), &workspace, &[]);
    assert!(!output.status.success());
    assert_eq!(markers(&workspace), (false, true));
}

#[test]
fn test_listing_writes_no_marker() {
    let dir = TempDir::new().unwrap();
    let workspace = dir.path().join("ws");
    let suite = write_suite(dir.path(), "suite.yaml", "");

    let output = netsweep(&suite, &workspace, &["--list"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("smoke: 1 variant(s)"));
    assert_eq!(markers(&workspace), (false, false));
}
