//! Tests for the gbackup binary's argument handling and exit codes.

use std::fs;
use std::process::{Command, Output};

use serde_json::json;
use tempfile::TempDir;

const TEST_KEY: &str = include_str!("fixtures/test-service-account-key.pem");

fn gbackup(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gbackup"))
        .args(args)
        .env_remove("GBACKUP_CREDENTIAL")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_no_args_prints_usage() {
    let output = gbackup(&[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Usage: gbackup <file-or-dir> <gfolderid>"));
    assert!(stdout(&output).contains("for more information"));
}

#[test]
fn test_single_positional_prints_usage() {
    let output = gbackup(&["onefile.txt"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Usage: gbackup"));
}

#[test]
fn test_help_exits_zero() {
    let output = gbackup(&["-h"]);
    assert_eq!(output.status.code(), Some(0));
    let help = stdout(&output);
    assert!(help.contains("gdrive-credential.json"));
    assert!(help.contains("--update"));
}

#[test]
fn test_too_many_args_prints_usage() {
    let output = gbackup(&["a", "b", "c"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Usage: gbackup"));
}

#[test]
fn test_update_with_upload_args_prints_usage() {
    let output = gbackup(&["--update", "file.txt", "FOLDERID"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Usage: gbackup"));
}

#[test]
fn test_missing_credential_fails() {
    let output = gbackup(&["--credential", "/nonexistent/key.json", "file.txt", "FOLDERID"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("/nonexistent/key.json not found"));
}

#[test]
fn test_missing_upload_path_fails_before_network() {
    let dir = TempDir::new().unwrap();
    let credential = dir.path().join("gdrive-credential.json");
    let key = json!({
        "client_email": "backup@project.iam.gserviceaccount.com",
        "private_key": TEST_KEY,
        "token_uri": "http://127.0.0.1:9/token"
    });
    fs::write(&credential, key.to_string()).unwrap();
    let missing = dir.path().join("missing.txt");

    let output = Command::new(env!("CARGO_BIN_EXE_gbackup"))
        .arg(&missing)
        .arg("FOLDERID")
        .env("GBACKUP_CREDENTIAL", &credential)
        .env_remove("RUST_LOG")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("missing.txt not found"));
}
