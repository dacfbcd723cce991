//! End-to-end tests for the histlake-ingest binary

mod common;

use assert_cmd::Command;
use common::{write_export, write_zip, EXPORT_2023_01};
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn ingest(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("histlake-ingest").unwrap();
    cmd.current_dir(root)
        .env_remove("HISTLAKE_LOG_LEVEL")
        .env_remove("HISTLAKE_LOG_OUTPUT")
        .env("HISTLAKE_PLANT", "P1")
        .env("HISTLAKE_MACHINE", "M1")
        .args(["--output", "lake", "--db", "history.db"]);
    cmd
}

#[test]
fn test_ingest_then_skip_then_force() {
    let dir = TempDir::new().unwrap();
    write_export(&dir.path().join("data/a.csv"));
    write_zip(&dir.path().join("data/b.zip"), &[("inner/b.csv", EXPORT_2023_01)]);

    ingest(dir.path())
        .arg("data")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 processed, 0 skipped, 0 failed"));
    assert!(dir.path().join("lake/P1/M1/pi/2023/01/a.parquet").exists());
    assert!(dir.path().join("history.db").exists());

    ingest(dir.path())
        .arg("data")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 processed, 2 skipped, 0 failed"));

    ingest(dir.path())
        .args(["--force", "data"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 processed, 0 skipped, 0 failed"));
}

#[test]
fn test_json_report() {
    let dir = TempDir::new().unwrap();
    write_export(&dir.path().join("data/a.csv"));

    let output = ingest(dir.path())
        .args(["--json", "data"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["outcome"], "completed");
    assert_eq!(report["summary"]["processed"], 1);
    assert_eq!(report["summary"]["files"][0]["outcome"]["status"], "processed");
    assert_eq!(report["summary"]["files"][0]["outcome"]["rows"], 2);
}

#[test]
fn test_no_work_exits_zero() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("empty")).unwrap();

    ingest(dir.path())
        .arg("empty")
        .assert()
        .success()
        .stdout(predicate::str::contains("No candidate files found"));
}

#[test]
fn test_failed_file_exits_two() {
    let dir = TempDir::new().unwrap();
    write_export(&dir.path().join("data/a.csv"));
    std::fs::write(dir.path().join("data/bad.csv"), "").unwrap();

    ingest(dir.path())
        .arg("data")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("1 processed, 0 skipped, 1 failed"));
}

#[test]
fn test_pattern_filters_file_names() {
    let dir = TempDir::new().unwrap();
    write_export(&dir.path().join("data/2023_01.csv"));
    write_export(&dir.path().join("data/2024_01.csv"));

    ingest(dir.path())
        .args(["--pattern", "2023", "data"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 processed"));
}

#[test]
fn test_missing_scope_is_a_usage_error() {
    let dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("histlake-ingest").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("HISTLAKE_PLANT")
        .env_remove("HISTLAKE_MACHINE")
        .arg("data")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--plant"));
}

#[test]
fn test_blank_scope_fails_before_touching_the_ledger() {
    let dir = TempDir::new().unwrap();

    ingest(dir.path())
        .env("HISTLAKE_PLANT", " ")
        .arg("data")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
    assert!(!dir.path().join("history.db").exists());
}
