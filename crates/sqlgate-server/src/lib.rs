// crates/sqlgate-server/src/lib.rs
// ============================================================================
// Module: sqlgate Server Library
// Description: Query router, renderer, and HTTP surface for the SQL gateway.
// Purpose: Serve authorized, bounded SQL queries over HTTP.
// Dependencies: axum, sqlgate-config, sqlgate-core, sqlgate-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! `sqlgate-server` turns a [`SqlGateConfig`](sqlgate_config::SqlGateConfig)
//! into a running gateway. The [`QueryRouter`] executes queries against the
//! source registry; the renderer encodes results as HTML, CSV, or
//! newline-delimited JSON; [`GatewayServer`] wires identity, authorization,
//! secret rotation, and the axum routes together.
//!
//! Security posture: callers, query text, and database contents are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod error;
mod http;
pub mod metrics;
pub mod query;
pub mod render;
pub mod rules;
pub mod secrets;
pub mod server;
pub mod ui;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::AccessMapAuthorizer;
pub use auth::Caller;
pub use auth::DefaultAuthorizer;
pub use auth::GrantAuthorizer;
pub use auth::IdentityProvider;
pub use auth::RequestInfo;
pub use auth::SourceAuthorizer;
pub use auth::TrustedHeaderIdentity;
pub use error::GatewayError;
pub use http::ACCESS_COOKIE_NAME;
pub use http::NO_BROWSERS_HEADER;
pub use metrics::CounterMetrics;
pub use metrics::ErrorKind;
pub use metrics::GatewayMetrics;
pub use metrics::NoopMetrics;
pub use metrics::RequestKind;
pub use query::DefaultQueryCheck;
pub use query::Query;
pub use query::QueryCheck;
pub use query::QueryOutcome;
pub use query::QueryRouter;
pub use query::SourceSummary;
pub use render::DisplayValue;
pub use render::RewriteRule;
pub use secrets::DirectorySecretStore;
pub use secrets::MemorySecretStore;
pub use secrets::SecretStore;
pub use server::GatewayServer;
pub use server::GatewayServerBuilder;
