//! Tests driving the rpl binary as a user would

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn rpl(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rpl"))
        .arg("--path")
        .arg(dir)
        .args(args)
        .output()
        .expect("failed to run rpl binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_init_and_status() {
    let dir = TempDir::new().unwrap();

    let output = rpl(dir.path(), &["init"]);
    assert!(output.status.success());
    assert!(dir.path().join(".rpl/config.json").exists());

    let output = rpl(dir.path(), &["status"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("snapshots: 0"));
    assert!(text.contains("running:"));
}

#[test]
fn test_create_list_restore() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("file.txt"), b"original").unwrap();

    assert!(rpl(dir.path(), &["init"]).status.success());
    assert!(rpl(dir.path(), &["create", "1.0.0"]).status.success());

    let output = rpl(dir.path(), &["list", "--detailed"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("1.0.0"));
    assert!(text.contains("1 files"));

    fs::write(dir.path().join("file.txt"), b"changed").unwrap();
    let output = rpl(dir.path(), &["restore", "1.0.0", "--yes"]);
    assert!(output.status.success());
    assert_eq!(fs::read(dir.path().join("file.txt")).unwrap(), b"original");
}

#[test]
fn test_duplicate_create_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    assert!(rpl(dir.path(), &["init"]).status.success());
    assert!(rpl(dir.path(), &["create", "1.0.0"]).status.success());

    let output = rpl(dir.path(), &["create", "1.0.0"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("1.0.0"));
}

#[test]
fn test_commands_fail_without_init() {
    let dir = TempDir::new().unwrap();

    let output = rpl(dir.path(), &["create", "1.0.0"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("rpl init"));
}

#[test]
fn test_stop_without_watcher_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    assert!(rpl(dir.path(), &["init"]).status.success());

    let output = rpl(dir.path(), &["stop"]);
    assert!(!output.status.success());
}

#[test]
fn test_restore_unknown_version_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    assert!(rpl(dir.path(), &["init"]).status.success());

    let output = rpl(dir.path(), &["restore", "9.9.9", "--yes"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("9.9.9"));
}
