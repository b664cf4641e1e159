// crates/sqlgate-store-sqlite/src/schema.rs
// ============================================================================
// Module: Query Log Schema
// Description: Current schema and digest-gated upgrade rules for the log.
// Purpose: Bring any known historical log database up to the current schema.
// Dependencies: rusqlite, sha2, tracing
// ============================================================================

//! ## Overview
//! The database structure (tables, views, their columns, and indexes) is hashed
//! into a digest. An empty database receives [`CURRENT_SCHEMA`] directly. A
//! database whose digest matches a historical schema is walked forward one
//! [`UpgradeRule`] at a time, and the digest is re-checked after every step.
//! Unknown digests fail closed. Digests are computed by loading each schema
//! into an in-memory database, so no hash constants are maintained by hand.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use rusqlite::Connection;
use sha2::Digest;
use sha2::Sha256;
use tracing::info;

use crate::query_log::SqliteStoreError;

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Current query log schema.
pub const CURRENT_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS queries (
    query_id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT UNIQUE NOT NULL
);
CREATE TABLE IF NOT EXISTS raw_query_log (
    author TEXT NULL,
    source TEXT NOT NULL,
    query_id INTEGER NOT NULL,
    timestamp DATETIME DEFAULT (datetime('now')) NOT NULL,
    elapsed INTEGER NULL,
    FOREIGN KEY (query_id) REFERENCES queries(query_id)
);
CREATE VIEW IF NOT EXISTS query_log AS
    SELECT author, source, query, timestamp, elapsed
    FROM raw_query_log JOIN queries USING (query_id);
";

/// First released schema, before elapsed times were recorded.
const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS queries (
    query_id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT UNIQUE NOT NULL
);
CREATE TABLE IF NOT EXISTS raw_query_log (
    author TEXT NULL,
    source TEXT NOT NULL,
    query_id INTEGER NOT NULL,
    timestamp DATETIME DEFAULT (datetime('now')) NOT NULL,
    FOREIGN KEY (query_id) REFERENCES queries(query_id)
);
CREATE VIEW IF NOT EXISTS query_log AS
    SELECT author, source, query, timestamp
    FROM raw_query_log JOIN queries USING (query_id);
";

/// One upgrade from a historical schema to the next.
pub struct UpgradeRule {
    /// Schema SQL the rule upgrades from.
    pub from_schema: &'static str,
    /// Schema SQL the rule produces.
    pub to_schema: &'static str,
    /// Statements applied in order, in one transaction.
    pub steps: &'static [&'static str],
}

/// Ordered upgrade rules.
pub const UPGRADES: &[UpgradeRule] = &[UpgradeRule {
    from_schema: SCHEMA_V1,
    to_schema: CURRENT_SCHEMA,
    steps: &[
        "ALTER TABLE raw_query_log ADD COLUMN elapsed INTEGER NULL",
        "DROP VIEW query_log",
        "CREATE VIEW query_log AS SELECT author, source, query, timestamp, elapsed \
         FROM raw_query_log JOIN queries USING (query_id)",
    ],
}];

// ============================================================================
// SECTION: Migration
// ============================================================================

/// Initializes or upgrades the log schema on `connection`.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Migration`] for unrecognized schemas or a step
/// that does not reach its target digest.
pub fn migrate(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let target = digest_of(CURRENT_SCHEMA)?;
    if is_empty(connection)? {
        let tx = connection.transaction().map_err(db_error)?;
        tx.execute_batch(CURRENT_SCHEMA).map_err(db_error)?;
        tx.commit().map_err(db_error)?;
        info!("query log schema created");
        return Ok(());
    }
    let mut current = schema_digest(connection)?;
    while current != target {
        let rule = find_rule(&current)?;
        let expected = digest_of(rule.to_schema)?;
        let tx = connection.transaction().map_err(db_error)?;
        for step in rule.steps {
            tx.execute_batch(step).map_err(db_error)?;
        }
        let applied = schema_digest(&tx)?;
        if applied != expected {
            return Err(SqliteStoreError::Migration(format!(
                "upgrade produced digest {applied}, expected {expected}"
            )));
        }
        tx.commit().map_err(db_error)?;
        info!(from = %current, to = %applied, "query log schema upgraded");
        current = applied;
    }
    Ok(())
}

/// Returns the structural digest of the schema on `connection`.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the catalog cannot be read.
pub fn schema_digest(connection: &Connection) -> Result<String, SqliteStoreError> {
    let mut objects = connection
        .prepare(
            "SELECT type, name, tbl_name FROM sqlite_schema \
             WHERE name NOT LIKE 'sqlite_%' ORDER BY type, name",
        )
        .map_err(db_error)?;
    let objects = objects
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    let mut columns = connection
        .prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) \
             ORDER BY cid",
        )
        .map_err(db_error)?;
    let mut hasher = Sha256::new();
    for (kind, name, table) in objects {
        hasher.update(format!("{kind}\u{0}{name}\u{0}{table}\n").as_bytes());
        if kind != "table" && kind != "view" {
            continue;
        }
        let rows = columns
            .query_map([&name], |row| {
                Ok(format!(
                    "  {}\u{0}{}\u{0}{}\u{0}{}\u{0}{}\n",
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(db_error)?;
        for line in rows {
            hasher.update(line.map_err(db_error)?.as_bytes());
        }
    }
    Ok(hex(&hasher.finalize()))
}

/// Computes the digest `schema` produces in a fresh in-memory database.
fn digest_of(schema: &str) -> Result<String, SqliteStoreError> {
    let connection = Connection::open_in_memory().map_err(db_error)?;
    connection.execute_batch(schema).map_err(db_error)?;
    schema_digest(&connection)
}

/// Finds the upgrade rule whose source schema has `digest`.
fn find_rule(digest: &str) -> Result<&'static UpgradeRule, SqliteStoreError> {
    for rule in UPGRADES {
        if digest_of(rule.from_schema)? == digest {
            return Ok(rule);
        }
    }
    Err(SqliteStoreError::Migration(format!("unrecognized schema digest {digest}")))
}

/// Returns true when the database holds no user objects.
fn is_empty(connection: &Connection) -> Result<bool, SqliteStoreError> {
    let count: i64 = connection
        .query_row(
            "SELECT count(*) FROM sqlite_schema WHERE name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )
        .map_err(db_error)?;
    Ok(count == 0)
}

/// Lower-case hex encoding.
fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Maps a `SQLite` failure.
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
