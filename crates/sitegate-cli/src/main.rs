// crates/sitegate-cli/src/main.rs
// ============================================================================
// Module: Sitegate CLI Entry Point
// Description: Command dispatcher for serving, classification, and config checks.
// Purpose: Provide the `sitegate` binary over the server and config crates.
// Dependencies: clap, sitegate-config, sitegate-core, sitegate-server, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! `sitegate serve` runs the HTTP front end, `sitegate classify` reports how
//! the configured virtual hosts classify one request, and
//! `sitegate config validate` checks a configuration file without serving.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use sitegate_config::SitegateConfig;
use sitegate_core::ClassificationResult;
use sitegate_core::ProtocolStatus;
use sitegate_server::SitegateServer;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "SITEGATE_LOG";
/// Log filter used when [`LOG_ENV`] is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "sitegate=info";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "sitegate", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Sitegate HTTP server.
    Serve(ServeCommand),
    /// Classify one request against the configured virtual hosts.
    Classify(ClassifyCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to sitegate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Configuration for the `classify` command.
#[derive(Args, Debug)]
struct ClassifyCommand {
    /// Optional config file path (defaults to sitegate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Request method.
    #[arg(long, value_name = "METHOD")]
    method: String,
    /// Raw `Host` header value; pass an empty string for a missing header.
    #[arg(long, value_name = "HOST")]
    host: String,
    /// Transport-layer destination port.
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,
    /// Raw `Content-Type` header value.
    #[arg(long, value_name = "TYPE")]
    content_type: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a config file.
    Validate(ConfigValidateCommand),
}

/// Configuration for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Optional config file path (defaults to sitegate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// JSON report printed by `classify`.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum ClassifyReport {
    /// Request belongs to a site.
    Matched {
        /// Matched site name.
        site: String,
        /// Root URL of the matched site.
        root_url: String,
        /// Request kind label.
        request_kind: &'static str,
        /// Publication kind label.
        publication_kind: &'static str,
        /// True when matched through the unmatched-host fallback.
        via_fallback: bool,
        /// Retry budget for the request.
        max_retries: u32,
    },
    /// Request is rejected at the protocol level.
    ProtocolError {
        /// HTTP status code.
        status: u16,
        /// Failure kind.
        kind: ProtocolStatus,
        /// Accepted methods for 405 responses.
        #[serde(skip_serializing_if = "Option::is_none")]
        allow: Option<Vec<String>>,
    },
}

impl From<ClassificationResult> for ClassifyReport {
    fn from(result: ClassificationResult) -> Self {
        match result {
            ClassificationResult::Matched(matched) => Self::Matched {
                site: matched.site.name().to_string(),
                root_url: matched.site.root_url().to_string(),
                request_kind: matched.request_kind.as_str(),
                publication_kind: matched.publication_kind.as_str(),
                via_fallback: matched.via_fallback,
                max_retries: matched.max_retries,
            },
            ClassificationResult::ProtocolError(error) => Self::ProtocolError {
                status: error.status.code(),
                kind: error.status,
                allow: error.allow,
            },
        }
    }
}

/// CLI error wrapper for user-facing error messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a message.
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
    init_tracing();
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
        Commands::Classify(command) => command_classify(&command),
        Commands::Config {
            command,
        } => command_config(command),
    }
}

/// Installs the `tracing` subscriber for operational logs.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let server = SitegateServer::from_config(&config)
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `classify` command.
fn command_classify(command: &ClassifyCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let report = classify(&config, command)?;
    let payload = serde_json::to_string_pretty(&report)
        .map_err(|err| CliError::new(format!("classification serialization failed: {err}")))?;
    write_stdout_line(&payload).map_err(|err| output_error("stdout", &err))?;
    Ok(ExitCode::SUCCESS)
}

/// Classifies the command's request against a configuration.
fn classify(config: &SitegateConfig, command: &ClassifyCommand) -> CliResult<ClassifyReport> {
    let classifier =
        config.classifier().map_err(|err| CliError::new(format!("classifier build failed: {err}")))?;
    let host = Some(command.host.as_str()).filter(|host| !host.is_empty());
    let result = classifier.classify(&command.method, host, command.port, command.content_type.as_deref());
    Ok(ClassifyReport::from(result))
}

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => command_config_validate(&command),
    }
}

/// Executes the config validation command.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let sites = config.vhosts.sites.len();
    write_stdout_line(&format!("config ok: {sites} site(s)")).map_err(|err| output_error("stdout", &err))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates configuration.
fn load_config(path: Option<&Path>) -> CliResult<SitegateConfig> {
    SitegateConfig::load(path).map_err(|err| CliError::new(format!("config load failed: {err}")))
}

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

/// Formats an output stream failure.
fn output_error(stream: &str, error: &std::io::Error) -> CliError {
    CliError::new(format!("failed to write {stream}: {error}"))
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
