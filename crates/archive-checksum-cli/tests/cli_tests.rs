//! CLI integration tests for archive-checksum.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes, and end-to-end runs against a file-backed ledger.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Get a command for the archive-checksum binary.
fn cmd() -> Command {
    Command::cargo_bin("archive-checksum").unwrap()
}

/// Write a config, a secrets file and one archive record with no tables.
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    std::fs::create_dir_all(root.join("ledger")).unwrap();
    std::fs::write(root.join("secrets.yaml"), "arn:secret:a1: pw\n").unwrap();
    std::fs::write(
        root.join("ledger").join("a1.json"),
        r#"{
  "id": "a1",
  "database_engine": "mysql",
  "hostname": "db.internal",
  "port": 3306,
  "username": "archiver",
  "secret_arn": "arn:secret:a1",
  "database": "shop",
  "table_details": []
}"#,
    )
    .unwrap();
    std::fs::write(
        root.join("config.yaml"),
        format!(
            "ledger:\n  path: {ledger}\ncredentials:\n  file: {secrets}\nquery:\n  data_root: {data}\n  output_location: {out}\n  poll_interval_ms: 10\nnotification:\n  queue_dir: {queues}\n",
            ledger = root.join("ledger").display(),
            secrets = root.join("secrets.yaml").display(),
            data = root.join("archive").display(),
            out = root.join("results").display(),
            queues = root.join("queues").display(),
        ),
    )
    .unwrap();
    dir
}

fn config_arg(dir: &Path) -> String {
    dir.join("config.yaml").to_str().unwrap().to_string()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("invoke"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("archive-checksum"));
}

#[test]
fn test_global_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("[default: config.yaml]"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_validate_requires_archive_id() {
    cmd()
        .args(["validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("<ARCHIVE_ID>"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "status", "a1"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "status", "a1"])
        .assert()
        .code(1);
}

#[test]
fn test_zero_poll_interval_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "query:").unwrap();
    writeln!(file, "  poll_interval_ms: 0").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "status", "a1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("poll_interval_ms"));
}

// =============================================================================
// End-to-end Tests
// =============================================================================

#[test]
fn test_validate_empty_archive() {
    let dir = workspace();
    cmd()
        .args(["--config", &config_arg(dir.path()), "--output-json", "validate", "a1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"archive_id\": \"a1\""));
}

#[test]
fn test_status_unknown_archive_exits_with_code_4() {
    let dir = workspace();
    cmd()
        .args(["--config", &config_arg(dir.path()), "status", "nope"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Archive record not found: nope"));
}

#[test]
fn test_status_shows_record() {
    let dir = workspace();
    cmd()
        .args(["--config", &config_arg(dir.path()), "status", "a1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Archive a1 (mysql shop@db.internal:3306)"));
}

#[test]
fn test_invoke_from_stdin() {
    let dir = workspace();
    cmd()
        .args(["--config", &config_arg(dir.path()), "invoke", "-"])
        .write_stdin(r#"{"body": "{\"archive_id\": \"a1\"}"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"statusCode\": 200"))
        .stdout(predicate::str::contains("Checksum validation complete"));
}

#[test]
fn test_invoke_unknown_archive_is_server_error() {
    let dir = workspace();
    let event = dir.path().join("event.json");
    std::fs::write(&event, r#"{"archive_id": "ghost"}"#).unwrap();

    cmd()
        .args([
            "--config",
            &config_arg(dir.path()),
            "invoke",
            event.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"statusCode\": 500"))
        .stdout(predicate::str::contains("Server Error"));
}
