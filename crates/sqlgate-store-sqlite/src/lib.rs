// crates/sqlgate-store-sqlite/src/lib.rs
// ============================================================================
// Module: sqlgate SQLite Store Library
// Description: SQLite driver and local query log for the SQL gateway.
// Purpose: Provide the built-in backing store and durable query history.
// Dependencies: rusqlite, sha2, sqlgate-core, time
// ============================================================================

//! ## Overview
//! This crate provides the `sqlite` [`Driver`](sqlgate_core::Driver), the
//! [`DriverRegistry`] used to resolve configured driver names, and the
//! [`LocalQueryLog`] with digest-gated schema upgrades.
//! Security posture: database contents are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod driver;
pub mod query_log;
pub mod queryable;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use driver::DriverRegistry;
pub use driver::SQLITE_DRIVER;
pub use driver::SqliteDriver;
pub use query_log::LocalQueryLog;
pub use query_log::QueryLogConfig;
pub use query_log::QueryLogEntry;
pub use query_log::SCHEMA_QUERY_NAME;
pub use query_log::SCHEMA_QUERY_SQL;
pub use query_log::SqliteStoreError;
pub use query_log::SqliteStoreMode;
pub use query_log::SqliteSyncMode;
pub use queryable::DEFAULT_POOL_SIZE;
pub use queryable::SqliteOpenOptions;
pub use queryable::SqliteQueryable;
