// crates/sqlgate-config/src/lib.rs
// ============================================================================
// Module: sqlgate Config Library
// Description: Configuration model, loading, and validation for sqlgate.
// Purpose: Single source of truth for gateway configuration semantics.
// Dependencies: serde, sqlgate-core, sqlgate-store-sqlite, toml
// ============================================================================

//! ## Overview
//! `sqlgate-config` owns the configuration model, loading rules, and
//! validation for the gateway server and CLI.
//! Security posture: config inputs are untrusted and must be validated.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
