// crates/query-relay-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and describe rendering.
// Purpose: Keep command shapes and descriptor output stable.
// Dependencies: query-relay-cli main helpers
// ============================================================================

//! ## Overview
//! Exercises clap parsing and the describe helpers without spawning the binary.

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

use clap::Parser;
use query_relay_config::QueryRelayConfig;

use super::Cli;
use super::Commands;
use super::ConfigCommand;
use super::describe_descriptor;
use super::validation_summary;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn serve_accepts_optional_config_path() {
    let cli = Cli::try_parse_from(["query-relay", "serve", "--config", "relay.toml"]).unwrap();
    let Commands::Serve(command) = cli.command else {
        panic!("expected serve");
    };
    assert_eq!(command.config.unwrap().to_str(), Some("relay.toml"));
}

#[test]
fn config_validate_parses_as_nested_subcommand() {
    let cli = Cli::try_parse_from(["query-relay", "config", "validate"]).unwrap();
    let Commands::Config {
        command: ConfigCommand::Validate(command),
    } = cli.command
    else {
        panic!("expected config validate");
    };
    assert!(command.config.is_none());
}

#[test]
fn describe_requires_namespace() {
    assert!(Cli::try_parse_from(["query-relay", "describe", "Optional[int]"]).is_err());
}

#[test]
fn describe_renders_canonical_form_and_qualified_names() {
    let lines = describe_descriptor(
        "Optional[ list[ Union[Acceptance, billing.Invoice] ] ]",
        "agreements",
    )
    .unwrap();
    assert_eq!(
        lines,
        vec![
            "Optional[list[Union[agreements.Acceptance, billing.Invoice]]]".to_string(),
            "nullable: yes".to_string(),
            "named: agreements.Acceptance".to_string(),
            "named: billing.Invoice".to_string(),
        ]
    );
}

#[test]
fn describe_reports_scalars_without_names() {
    let lines = describe_descriptor("list[int]", "agreements").unwrap();
    assert_eq!(lines, vec!["list[int]".to_string(), "nullable: no".to_string()]);
}

#[test]
fn describe_rejects_malformed_descriptors() {
    let err = describe_descriptor("Optional[int", "agreements").unwrap_err();
    assert!(err.to_string().starts_with("invalid descriptor"));
    let err = describe_descriptor("int", " ").unwrap_err();
    assert!(err.to_string().contains("--namespace"));
}

#[test]
fn describe_rejects_namespaces_that_would_not_reparse() {
    let err = describe_descriptor("Acceptance", "my-ns").unwrap_err();
    assert_eq!(err.to_string(), "invalid descriptor: invalid namespace 'my-ns'");
}

#[test]
fn validation_summary_counts_sections() {
    let config = QueryRelayConfig::from_toml(
        "[[databases]]\nid = \"main\"\npath = \"relay.db\"\n\n\
         [[sanitization]]\nentity_type = \"Acceptance\"\npolicy = \"pass_through\"\n",
    )
    .unwrap();
    assert_eq!(validation_summary(&config), "config valid: 1 database(s), 1 sanitization policy");
}
