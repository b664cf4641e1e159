// crates/sqlgate-client/src/lib.rs
// ============================================================================
// Module: sqlgate Client Library
// Description: Async HTTP client for a running sqlgate gateway.
// Purpose: Query sources and read gateway metadata from Rust programs.
// Dependencies: reqwest, serde, csv
// ============================================================================

//! ## Overview
//! [`GatewayClient`] speaks to the gateway's non-browser routes: `/meta` for
//! source and link metadata, `/csv` for tabular results, and `/json` for
//! newline-delimited rows decoded into caller types. Every request carries the
//! non-browser marker header.
//!
//! Security posture: responses are untrusted; bodies are size-limited and
//! decoding fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod client;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use client::ClientError;
pub use client::CsvRows;
pub use client::DEFAULT_TIMEOUT;
pub use client::GatewayClient;
pub use client::LinkInfo;
pub use client::MAX_RESPONSE_BYTES;
pub use client::ServerInfo;
pub use client::SourceInfo;
