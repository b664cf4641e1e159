// crates/sqlgate-cli/src/main.rs
// ============================================================================
// Module: sqlgate CLI Entry Point
// Description: Command dispatcher for serving and checking gateway configs.
// Purpose: Run the gateway and manage its configuration file.
// Dependencies: clap, sqlgate-config, sqlgate-server, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! The `sqlgate` binary serves the gateway (`serve`), writes the canonical
//! example configuration (`init-config`), and validates a configuration
//! without opening any source (`check-config`). Operational logs go to stderr
//! through `tracing`; command output goes to stdout.
//!
//! Security posture: configuration files are untrusted input and are validated
//! before use; `init-config` never overwrites an existing file.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use sqlgate_config::SqlGateConfig;
use sqlgate_config::config_toml_example;
use sqlgate_server::GatewayServer;
use sqlgate_store_sqlite::DriverRegistry;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "sqlgate", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway.
    Serve(ServeCommand),
    /// Write the example configuration to a new file.
    InitConfig(InitConfigCommand),
    /// Validate a configuration file.
    CheckConfig(CheckConfigCommand),
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Config file path (defaults to `SQLGATE_CONFIG`, then sqlgate.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override `server.bind`.
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,
    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

/// Configuration for the `init-config` command.
#[derive(Args, Debug)]
struct InitConfigCommand {
    /// Destination path; must not exist.
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

/// Configuration for the `check-config` command.
#[derive(Args, Debug)]
struct CheckConfigCommand {
    /// Config file path (defaults to `SQLGATE_CONFIG`, then sqlgate.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Log output formats.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error carrying a user-facing message.
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
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::InitConfig(command) => command_init_config(&command),
        Commands::CheckConfig(command) => command_check_config(&command),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    init_logging(command.log_format)?;
    let config = load_config(command.config.as_deref(), command.bind)?;
    let addr = config
        .server
        .bind_addr()
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;

    let server = tokio::task::spawn_blocking(move || {
        GatewayServer::from_config(config, &DriverRegistry::default())
    })
    .await
    .map_err(|err| CliError::new(format!("gateway init failed: init join failed: {err}")))?
    .map_err(|err| CliError::new(format!("gateway init failed: {err}")))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| CliError::new(format!("failed to bind {addr}: {err}")))?;

    let served = server.serve(listener, shutdown_signal()).await;
    let closed = server.close();
    served.map_err(|err| CliError::new(format!("gateway failed: {err}")))?;
    closed.map_err(|err| CliError::new(format!("failed to close sources: {err}")))?;
    info!("gateway stopped");
    Ok(ExitCode::SUCCESS)
}

/// Loads the config and applies the bind override.
fn load_config(path: Option<&Path>, bind: Option<SocketAddr>) -> CliResult<SqlGateConfig> {
    let mut config = SqlGateConfig::load(path)
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    if let Some(bind) = bind {
        config.server.bind = bind.to_string();
        config.validate().map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    }
    Ok(config)
}

/// Installs the stderr `tracing` subscriber.
fn init_logging(format: LogFormat) -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| CliError::new(format!("failed to install logging: {err}")))
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "shutdown signal unavailable");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Executes the `init-config` command.
fn command_init_config(command: &InitConfigCommand) -> CliResult<ExitCode> {
    write_new_file(&command.path, config_toml_example().as_bytes())?;
    write_stdout_line(&format!("wrote {}", command.path.display()))
        .map_err(|err| CliError::new(output_error(&err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `check-config` command.
fn command_check_config(command: &CheckConfigCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref(), None)?;
    let message = format!(
        "config ok: {} sources, bind {}",
        config.sources.len(),
        config.server.bind
    );
    write_stdout_line(&message).map_err(|err| CliError::new(output_error(&err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Writes `contents` to `path`, refusing to replace an existing file.
fn write_new_file(path: &Path, contents: &[u8]) -> CliResult<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path).map_err(|err| {
        if err.kind() == ErrorKind::AlreadyExists {
            CliError::new(format!("refusing to overwrite {}", path.display()))
        } else {
            CliError::new(format!("failed to create {}: {err}", path.display()))
        }
    })?;
    file.write_all(contents)
        .and_then(|()| file.flush())
        .map_err(|err| CliError::new(format!("failed to write {}: {err}", path.display())))
}

// ============================================================================
// SECTION: Output
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

/// Formats an output failure.
fn output_error(error: &std::io::Error) -> String {
    format!("failed to write to stdout: {error}")
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
