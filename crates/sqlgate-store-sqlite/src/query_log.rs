// crates/sqlgate-store-sqlite/src/query_log.rs
// ============================================================================
// Module: Local Query Log
// Description: Append-only SQLite log of executed gateway queries.
// Purpose: Record who ran what, where, and how long it took.
// Dependencies: rusqlite, serde, sqlgate-core, thiserror
// ============================================================================

//! ## Overview
//! [`LocalQueryLog`] owns a single writer connection. Query texts are stored
//! once in `queries` and referenced from `raw_query_log`; the `query_log` view
//! joins the two. The log can also be exported as a read-only source through
//! [`LocalQueryLog::open_reader`].
//! Security posture: query texts are untrusted and stored verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use sqlgate_core::QueryError;
use thiserror::Error;

use crate::queryable::SqliteOpenOptions;
use crate::queryable::SqliteQueryable;
use crate::schema;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Named query exported with the read-only log source.
pub const SCHEMA_QUERY_NAME: &str = "schema";
/// SQL behind [`SCHEMA_QUERY_NAME`].
pub const SCHEMA_QUERY_SQL: &str = "select * from sqlite_schema";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Normal synchronous mode; a crash may drop the newest log rows.
    #[default]
    Normal,
    /// Full synchronous mode.
    Full,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Full => "full",
        }
    }
}

/// Configuration for the local query log.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryLogConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl QueryLogConfig {
    /// Returns a config for `path` with default settings.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Default busy timeout for serde.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding logged query text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid store configuration or data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Schema migration failure.
    #[error("sqlite store migration failed: {0}")]
    Migration(String),
}

// ============================================================================
// SECTION: Log
// ============================================================================

/// One row of the `query_log` view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLogEntry {
    /// Caller identity, if any.
    pub author: Option<String>,
    /// Source queried.
    pub source: String,
    /// Resolved query text.
    pub query: String,
    /// Insertion time as stored by `SQLite`.
    pub timestamp: String,
    /// Elapsed execution time in microseconds, when non-zero.
    pub elapsed_us: Option<i64>,
}

/// Append-only log of executed queries.
///
/// # Invariants
/// - Each distinct query text is stored exactly once in `queries`.
/// - Writes are serialized through the writer mutex.
pub struct LocalQueryLog {
    /// Log configuration.
    config: QueryLogConfig,
    /// Writer connection.
    connection: Mutex<Connection>,
}

impl fmt::Debug for LocalQueryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalQueryLog").field("path", &self.config.path).finish_non_exhaustive()
    }
}

impl LocalQueryLog {
    /// Opens the log, creating or upgrading its schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// migrated.
    pub fn open(config: QueryLogConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        schema::migrate(&mut connection)?;
        Ok(Self {
            config,
            connection: Mutex::new(connection),
        })
    }

    /// Returns the database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Records one executed query. A zero `elapsed` is stored as NULL, as is an
    /// empty `author`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the write fails.
    pub fn log_query(
        &self,
        author: &str,
        source: &str,
        query: &str,
        elapsed: Duration,
    ) -> Result<(), SqliteStoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(db_error)?;
        let existing: Option<i64> = tx
            .query_row("SELECT query_id FROM queries WHERE query = ?1", params![query], |row| {
                row.get(0)
            })
            .optional()
            .map_err(db_error)?;
        let query_id = if let Some(query_id) = existing {
            query_id
        } else {
            tx.execute("INSERT INTO queries (query) VALUES (?1)", params![query])
                .map_err(db_error)?;
            tx.last_insert_rowid()
        };
        let author = (!author.is_empty()).then_some(author);
        let elapsed_us = (!elapsed.is_zero())
            .then(|| i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX));
        tx.execute(
            "INSERT INTO raw_query_log (author, source, query_id, elapsed) VALUES (?1, ?2, ?3, ?4)",
            params![author, source, query_id, elapsed_us],
        )
        .map_err(db_error)?;
        tx.commit().map_err(db_error)
    }

    /// Returns up to `limit` log entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the read fails.
    pub fn recent(&self, limit: usize) -> Result<Vec<QueryLogEntry>, SqliteStoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let connection = self.lock()?;
        let mut stmt = connection
            .prepare(
                "SELECT author, source, query, timestamp, elapsed FROM raw_query_log \
                 JOIN queries USING (query_id) ORDER BY raw_query_log.rowid DESC LIMIT ?1",
            )
            .map_err(db_error)?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(QueryLogEntry {
                    author: row.get(0)?,
                    source: row.get(1)?,
                    query: row.get(2)?,
                    timestamp: row.get(3)?,
                    elapsed_us: row.get(4)?,
                })
            })
            .map_err(db_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_error)
    }

    /// Opens a read-only view of the log for serving as a query source.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Driver`] when the reader cannot be opened.
    pub fn open_reader(&self) -> Result<SqliteQueryable, QueryError> {
        let options = SqliteOpenOptions {
            pool_size: 1,
            busy_timeout_ms: self.config.busy_timeout_ms,
            ..SqliteOpenOptions::read_only()
        };
        SqliteQueryable::open(&self.config.path.to_string_lossy(), options)
    }

    /// Locks the writer connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("query log mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens the writer connection and applies pragmas.
fn open_connection(config: &QueryLogConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
    Ok(connection)
}

/// Maps a `SQLite` failure.
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}
