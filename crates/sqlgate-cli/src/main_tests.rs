// crates/sqlgate-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Tests
// Description: Unit tests for argument parsing and config commands.
// Purpose: Ensure config files are written once and validated fail-closed.
// Dependencies: clap, sqlgate-config, tempfile
// ============================================================================

//! ## Overview
//! Covers `serve` flag parsing, `init-config` overwrite refusal, and
//! `check-config` validation.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;

use clap::Parser;
use sqlgate_config::SqlGateConfig;
use tempfile::TempDir;

use super::CheckConfigCommand;
use super::Cli;
use super::Commands;
use super::InitConfigCommand;
use super::LogFormat;
use super::command_check_config;
use super::command_init_config;
use super::load_config;

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn serve_flags_parse() {
    let cli = Cli::try_parse_from([
        "sqlgate",
        "serve",
        "--config",
        "gate.toml",
        "--bind",
        "127.0.0.1:9000",
        "--log-format",
        "json",
    ])
    .unwrap();
    let Commands::Serve(serve) = cli.command else {
        panic!("expected serve");
    };
    assert_eq!(serve.config.unwrap().to_string_lossy(), "gate.toml");
    assert_eq!(serve.bind.unwrap().port(), 9000);
    assert_eq!(serve.log_format, LogFormat::Json);
}

#[test]
fn serve_defaults_to_text_logs() {
    let cli = Cli::try_parse_from(["sqlgate", "serve"]).unwrap();
    let Commands::Serve(serve) = cli.command else {
        panic!("expected serve");
    };
    assert_eq!(serve.log_format, LogFormat::Text);
    assert!(serve.bind.is_none());
}

#[test]
fn invalid_bind_is_rejected_by_the_parser() {
    assert!(Cli::try_parse_from(["sqlgate", "serve", "--bind", "nowhere"]).is_err());
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

#[test]
fn init_config_writes_a_valid_example_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sqlgate.toml");
    let command = InitConfigCommand {
        path: path.clone(),
    };
    command_init_config(&command).unwrap();
    let written = fs::read_to_string(&path).unwrap();
    SqlGateConfig::from_toml(&written).unwrap();

    let err = command_init_config(&command).unwrap_err();
    assert!(err.to_string().starts_with("refusing to overwrite"));
    assert_eq!(fs::read_to_string(&path).unwrap(), written);
}

#[test]
fn check_config_reports_invalid_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[server]\nmax_rows = 0\n").unwrap();
    let err = command_check_config(&CheckConfigCommand {
        config: Some(path),
    })
    .unwrap_err();
    assert!(err.to_string().contains("server.max_rows"));
}

#[test]
fn bind_override_is_revalidated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gate.toml");
    fs::write(
        &path,
        "[server]\nbind = \"127.0.0.1:8080\"\n\n[[sources]]\nsource = \"main\"\ndriver = \
         \"sqlite\"\nurl = \"main.db\"\n",
    )
    .unwrap();
    let config = load_config(Some(&path), Some("127.0.0.1:9100".parse().unwrap())).unwrap();
    assert_eq!(config.server.bind, "127.0.0.1:9100");

    let err = load_config(Some(&path), Some("0.0.0.0:9100".parse().unwrap())).unwrap_err();
    assert!(err.to_string().contains("non-loopback"));
}
