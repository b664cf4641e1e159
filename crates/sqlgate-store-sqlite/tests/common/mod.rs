// crates/sqlgate-store-sqlite/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Seeded SQLite databases for driver and log tests.
// Purpose: Provide reusable on-disk fixtures in temporary directories.
// Dependencies: rusqlite, sqlgate-core, tempfile
// ============================================================================

//! ## Overview
//! Builds small `SQLite` files under a [`TempDir`] and collects query output
//! into plain vectors.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use rusqlite::Connection;
use sqlgate_core::QueryContext;
use sqlgate_core::QueryError;
use sqlgate_core::Queryable;
use sqlgate_core::SqlValue;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Creates `fruit.db` with table `t(id INTEGER, value TEXT)` holding two rows.
pub fn fruit_db(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("fruit.db");
    let connection = Connection::open(&path).unwrap();
    connection
        .execute_batch(
            "CREATE TABLE t (id INTEGER, value TEXT);
             INSERT INTO t VALUES (1, 'apple'), (2, 'pear');
             CREATE TABLE events (name TEXT, at DATETIME, day DATE, payload BLOB);
             INSERT INTO events VALUES ('launch', '2024-03-05 10:11:12', '2024-03-05', x'ff00');",
        )
        .unwrap();
    path
}

/// Runs `sql` and returns columns and rows.
pub fn collect(
    db: &dyn Queryable,
    ctx: &QueryContext,
    sql: &str,
    params: &[SqlValue],
) -> Result<(Vec<String>, Vec<Vec<SqlValue>>), QueryError> {
    let mut columns = Vec::new();
    let mut rows = Vec::new();
    db.query(ctx, sql, params, &mut |set| {
        columns = set.columns().to_vec();
        while let Some(row) = set.next_row()? {
            rows.push(row);
        }
        Ok(())
    })?;
    Ok((columns, rows))
}
