//! CLI integration tests for fdb-pg-sync.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for configuration error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the fdb-pg-sync binary.
fn cmd() -> Command {
    Command::cargo_bin("fdb-pg-sync").unwrap()
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
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success();
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fdb-pg-sync"));
}

// =============================================================================
// Configuration Error Tests
// =============================================================================

#[test]
fn test_missing_config_file_fails() {
    cmd()
        .args(["--config", "/nonexistent/config.yaml", "run"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_invalid_yaml_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "this is: [not, valid, sync, config").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_config_validation_error_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    // Two tables but no join_key
    writeln!(
        file,
        r#"
source:
  host: localhost
  database: /data/ACC-0004.FDB
  user: SYSDBA
  password: masterkey
target:
  host: localhost
  database: labels
  user: postgres
  password: password
sync:
  tables:
    - name: PH_PIDTL
      alias_suffix: "1"
      columns:
        - {{ name: QTY, type: decimal }}
        - {{ name: DTLKEY, type: integer }}
    - name: PH_PI
      columns:
        - {{ name: DOCDATE, type: date }}
  table: Label_Data
  identifier_column: DTLKEY1
  quantity_column: QTY1
"#
    )
    .unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "check"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("join_key"));
}
