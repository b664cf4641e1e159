// crates/sqlgate-store-sqlite/tests/query_log.rs
// ============================================================================
// Module: Local Query Log Tests
// Description: Log writes, text dedup, and read-only export.
// Purpose: Validate the persisted query history.
// Dependencies: sqlgate-core, sqlgate-store-sqlite, tempfile
// ============================================================================

//! ## Overview
//! Exercises [`LocalQueryLog`]:
//! - Repeated query texts share one `queries` row
//! - Zero elapsed times and empty authors are stored as NULL
//! - The read-only reader sees the joined `query_log` view
//! - Reopening an existing log is idempotent

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::time::Duration;

use common::collect;
use sqlgate_core::QueryContext;
use sqlgate_core::SqlValue;
use sqlgate_store_sqlite::LocalQueryLog;
use sqlgate_store_sqlite::QueryLogConfig;
use sqlgate_store_sqlite::SCHEMA_QUERY_SQL;
use sqlgate_store_sqlite::SqliteStoreError;
use tempfile::TempDir;

#[test]
fn logs_queries_and_dedups_text() {
    let dir = TempDir::new().unwrap();
    let log = LocalQueryLog::open(QueryLogConfig::new(dir.path().join("state/log.db"))).unwrap();
    log.log_query("alice", "main", "select 1", Duration::from_micros(1500)).unwrap();
    log.log_query("", "main", "select 1", Duration::ZERO).unwrap();
    log.log_query("bob", "other", "select 2", Duration::from_millis(2)).unwrap();

    let entries = log.recent(10).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].author.as_deref(), Some("bob"));
    assert_eq!(entries[0].elapsed_us, Some(2000));
    assert_eq!(entries[1].author, None);
    assert_eq!(entries[1].elapsed_us, None);
    assert_eq!(entries[2].elapsed_us, Some(1500));

    let reader = log.open_reader().unwrap();
    let (_, rows) =
        collect(&reader, &QueryContext::new(), "select count(*) from queries", &[]).unwrap();
    assert_eq!(rows, vec![vec![SqlValue::Integer(2)]]);
}

#[test]
fn reader_exposes_view_and_schema() {
    let dir = TempDir::new().unwrap();
    let log = LocalQueryLog::open(QueryLogConfig::new(dir.path().join("log.db"))).unwrap();
    log.log_query("alice", "main", "select 1", Duration::from_micros(7)).unwrap();
    let reader = log.open_reader().unwrap();

    let (columns, rows) = collect(
        &reader,
        &QueryContext::new(),
        "select author, source, query, elapsed from query_log",
        &[],
    )
    .unwrap();
    assert_eq!(columns, vec!["author", "source", "query", "elapsed"]);
    assert_eq!(
        rows,
        vec![vec![
            SqlValue::Text("alice".to_string()),
            SqlValue::Text("main".to_string()),
            SqlValue::Text("select 1".to_string()),
            SqlValue::Integer(7),
        ]]
    );
    let (_, schema_rows) = collect(&reader, &QueryContext::new(), SCHEMA_QUERY_SQL, &[]).unwrap();
    assert!(schema_rows.len() >= 3);

    let (_, stamped) =
        collect(&reader, &QueryContext::new(), "select timestamp from query_log", &[]).unwrap();
    assert!(matches!(stamped[0][0], SqlValue::Timestamp(_)));
}

#[test]
fn reopening_existing_log_keeps_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.db");
    {
        let log = LocalQueryLog::open(QueryLogConfig::new(&path)).unwrap();
        log.log_query("alice", "main", "select 1", Duration::from_micros(1)).unwrap();
    }
    let log = LocalQueryLog::open(QueryLogConfig::new(&path)).unwrap();
    assert_eq!(log.recent(10).unwrap().len(), 1);
    assert_eq!(log.path(), path.as_path());
}

#[test]
fn directory_path_is_rejected() {
    let dir = TempDir::new().unwrap();
    let err = LocalQueryLog::open(QueryLogConfig::new(dir.path())).err().unwrap();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}
