// crates/query-relay-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: Integration tests that drive the query-relay binary.
// Purpose: Ensure commands exit with the right codes and output.
// Dependencies: query-relay-cli binary
// ============================================================================
//! ## Overview
//! Spawns the built binary with temporary config files.
//!
//! Security posture: invalid configs and non-loopback binds must fail before
//! any database is opened or socket is bound.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn query_relay_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_query-relay"))
}

fn run(args: &[&str]) -> Output {
    Command::new(query_relay_bin())
        .args(args)
        .env_remove("QUERY_RELAY_CONFIG")
        .output()
        .expect("run query-relay")
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("query-relay.toml");
    fs::write(&path, body).unwrap();
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn config_validate_reports_summary() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "[approval]\nmode = \"deny_all\"\n\n\
         [[databases]]\nid = \"main\"\npath = \"relay.db\"\n\n\
         [[databases]]\nid = \"audit\"\npath = \"audit.db\"\nread_only = true\n\n\
         [[sanitization]]\nentity_type = \"Acceptance\"\npolicy = \"column_mask\"\n\
         columns = { signer_name = \"preserve_format\" }\n\n\
         [[sanitization]]\nentity_type = \"Agreement\"\npolicy = \"pass_through\"\n",
    );
    let output = run(&["config", "validate", "--config", config.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "config valid: 2 database(s), 2 sanitization policies");
}

#[test]
fn config_validate_fails_closed_on_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[server]\nbind = \"127.0.0.1:8710\"\n");
    let output = run(&["config", "validate", "--config", config.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).starts_with("failed to load config"));
    assert!(stdout(&output).is_empty());
}

#[test]
fn config_validate_reports_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let output = run(&["config", "validate", "--config", missing.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("config io error"));
}

#[test]
fn serve_refuses_non_loopback_bind_without_opt_in() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "[server]\nbind = \"0.0.0.0:8710\"\n\n[[databases]]\nid = \"main\"\npath = \"relay.db\"\n",
    );
    let output = run(&["serve", "--config", config.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("allow_non_loopback"));
    assert!(!dir.path().join("relay.db").exists());
}

#[test]
fn describe_prints_canonical_descriptor() {
    let output = run(&["describe", "list[ Optional[Acceptance] ]", "--namespace", "agreements"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "list[Optional[agreements.Acceptance]]\nnullable: no\nnamed: agreements.Acceptance\n"
    );
}

#[test]
fn describe_rejects_unknown_generics() {
    let output = run(&["describe", "Mapping[str, int]", "--namespace", "agreements"]);
    assert!(!output.status.success());
    assert!(stderr(&output).starts_with("invalid descriptor"));
}
