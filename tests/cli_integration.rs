//! CLI integration tests
//!
//! Drive the `consilium` binary for the paths that need no live backend:
//! argument handling, step universe listing, and input validation.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

fn consilium_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_consilium"))
}

fn run(args: &[&str]) -> Output {
    Command::new(consilium_bin())
        .args(args)
        .env_remove("CONSILIUM_PROVIDER")
        .env_remove("CONSILIUM_STEPS_FILE")
        .env_remove("CONSILIUM_API_URL")
        .env_remove("CONSILIUM_REQUEST_TIMEOUT")
        .env_remove("CONSILIUM_LOG_LEVEL")
        .output()
        .expect("Failed to run consilium")
}

#[test]
fn test_cli_help() {
    let output = run(&["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("consult"));
    assert!(stdout.contains("summarize"));
    assert!(stdout.contains("steps"));
}

#[test]
fn test_steps_lists_builtin_universe() {
    let output = run(&["steps", "--format", "json"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["version"], 1);
    assert_eq!(value["triage"], "gp");
    assert_eq!(value["imaging_step"], "radiologist");
    assert_eq!(value["steps"].as_array().unwrap().len(), 25);
}

#[test]
fn test_steps_rejects_invalid_universe() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("steps.yaml");
    fs::write(&path, "version: 2\n").unwrap();

    let output = run(&["-q", "steps", "--steps", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_consult_rejects_empty_report() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.txt");
    fs::write(&path, "   \n").unwrap();

    let output = run(&["-q", "consult", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_consult_http_provider_requires_url() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.txt");
    fs::write(&path, "Chest pain on exertion").unwrap();

    let output = run(&["-q", "consult", path.to_str().unwrap(), "--provider", "http"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_consult_rejects_unknown_provider() {
    let output = run(&["-q", "consult", "--provider", "watson"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_summarize_missing_run_file() {
    let output = run(&["-q", "summarize", "/nonexistent/run.json"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_invalid_format_is_usage_error() {
    let output = run(&["steps", "--format", "dockerfile"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid value"));
}
