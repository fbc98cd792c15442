// crates/query-relay-cli/src/main.rs
// ============================================================================
// Module: Query Relay CLI Entry Point
// Description: Command dispatcher for the gateway and offline utilities.
// Purpose: Run the execution gateway and inspect configs and descriptors.
// Dependencies: clap, query-relay-config, query-relay-core, query-relay-gateway, tokio
// ============================================================================

//! ## Overview
//! Commands:
//! - `serve` loads `query-relay.toml`, opens every configured database, and
//!   runs the HTTP gateway on a multi-threaded tokio runtime.
//! - `config validate` loads and validates a config without opening anything.
//! - `describe` parses a type descriptor and prints its canonical form.
//!
//! Security posture: config files and descriptors are untrusted input and
//! are validated before use; see the config crate for limits.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use query_relay_config::ApprovalMode;
use query_relay_config::QueryRelayConfig;
use query_relay_core::Namespace;
use query_relay_core::TypeDescriptor;
use query_relay_gateway::Gateway;
use query_relay_gateway::GatewayServer;
use query_relay_gateway::approver_from_config;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "query-relay", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the execution gateway.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Parse a type descriptor and print its canonical form.
    Describe(DescribeCommand),
}

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to query-relay.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a config file.
    Validate(ConfigValidateCommand),
}

/// Arguments for config validation.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Optional config file path (defaults to query-relay.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for the `describe` command.
#[derive(Args, Debug)]
struct DescribeCommand {
    /// Descriptor text, for example `Optional[list[Acceptance]]`.
    #[arg(value_name = "DESCRIPTOR")]
    descriptor: String,
    /// Namespace the descriptor was captured from.
    #[arg(long, value_name = "NAMESPACE")]
    namespace: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => command_config(command),
        Commands::Describe(command) => command_describe(&command),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = QueryRelayConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let bind = config.server.bind_addr().map_err(|err| CliError::new(err.to_string()))?;
    let server_config = config.server.clone();
    let interactive = config.approval.mode == ApprovalMode::Terminal;
    let approver = approver_from_config(&config.approval);

    let gateway = tokio::task::spawn_blocking(move || Gateway::from_config(&config, approver))
        .await
        .map_err(|err| CliError::new(format!("gateway init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("gateway init failed: {err}")))?;

    write_stderr_line(&format!("query-relay listening on http://{bind}"))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    if interactive {
        write_stderr_line("write approvals are prompted on this terminal")
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }

    GatewayServer::new(Arc::new(gateway), server_config)
        .serve()
        .await
        .map_err(|err| CliError::new(format!("gateway server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => command_config_validate(&command),
    }
}

/// Executes the config validation command.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let config = QueryRelayConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    write_stdout_line(&validation_summary(&config))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Summarizes a validated config in one line.
fn validation_summary(config: &QueryRelayConfig) -> String {
    format!(
        "config valid: {} database(s), {} sanitization polic{}",
        config.databases.len(),
        config.sanitization.len(),
        if config.sanitization.len() == 1 { "y" } else { "ies" }
    )
}

// ============================================================================
// SECTION: Describe Command
// ============================================================================

/// Executes the `describe` command.
fn command_describe(command: &DescribeCommand) -> CliResult<ExitCode> {
    let lines = describe_descriptor(&command.descriptor, &command.namespace)?;
    for line in lines {
        write_stdout_line(&line).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Parses a descriptor and renders its description lines.
fn describe_descriptor(text: &str, namespace: &str) -> CliResult<Vec<String>> {
    if namespace.trim().is_empty() {
        return Err(CliError::new("--namespace must be non-empty".to_string()));
    }
    let descriptor = TypeDescriptor::parse(text, &Namespace::new(namespace))
        .map_err(|err| CliError::new(format!("invalid descriptor: {err}")))?;
    let mut named = BTreeSet::new();
    collect_named(&descriptor, &mut named);
    let mut lines = vec![
        descriptor.to_string(),
        format!("nullable: {}", yes_no(descriptor.accepts_null())),
    ];
    for name in named {
        lines.push(format!("named: {name}"));
    }
    Ok(lines)
}

/// Collects fully qualified names referenced by a descriptor.
fn collect_named(descriptor: &TypeDescriptor, out: &mut BTreeSet<String>) {
    match descriptor {
        TypeDescriptor::Scalar(_) => {}
        TypeDescriptor::Optional(inner) | TypeDescriptor::ListOf(inner) => {
            collect_named(inner, out);
        }
        TypeDescriptor::UnionOf(alternatives) => {
            for alternative in alternatives {
                collect_named(alternative, out);
            }
        }
        TypeDescriptor::Named {
            namespace,
            name,
        } => {
            out.insert(format!("{namespace}.{name}"));
        }
    }
}

/// Renders a flag as `yes`/`no`.
const fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
