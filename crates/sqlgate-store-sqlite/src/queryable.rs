// crates/sqlgate-store-sqlite/src/queryable.rs
// ============================================================================
// Module: SQLite Queryable
// Description: Queryable implementation over a small SQLite connection pool.
// Purpose: Execute gateway queries in read transactions with prompt abort.
// Dependencies: rusqlite, sqlgate-core, time
// ============================================================================

//! ## Overview
//! [`SqliteQueryable`] keeps a fixed pool of connections and picks one per
//! query with a round-robin cursor. Every statement runs inside a transaction
//! with a progress handler that aborts as soon as the [`QueryContext`] is
//! cancelled or past its deadline. Text stored in `DATE`, `DATETIME`, or
//! `TIMESTAMP` columns is surfaced as a timestamp when it parses.
//! Security posture: SQL and stored values are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::Rows;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use rusqlite::types::ValueRef;
use sqlgate_core::QueryContext;
use sqlgate_core::QueryError;
use sqlgate_core::Queryable;
use sqlgate_core::RowSet;
use sqlgate_core::ScanFn;
use sqlgate_core::SqlValue;
use time::Date;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::UtcOffset;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of pooled connections per source.
pub const DEFAULT_POOL_SIZE: usize = 4;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Virtual machine instructions between cancellation checks.
const PROGRESS_INTERVAL_OPS: i32 = 1_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Options applied when opening a [`SqliteQueryable`].
///
/// # Invariants
/// - `pool_size` is at least one; in-memory databases always use one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteOpenOptions {
    /// Connections kept in the pool.
    pub pool_size: usize,
    /// Open connections read-only.
    pub read_only: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for SqliteOpenOptions {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            read_only: false,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl SqliteOpenOptions {
    /// Returns read-only options with the default pool size.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Returns the open flags for these options.
    fn flags(self) -> OpenFlags {
        let mode = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };
        mode | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
    }
}

// ============================================================================
// SECTION: Queryable
// ============================================================================

/// Pooled `SQLite` connection implementing [`Queryable`].
///
/// # Invariants
/// - Each pooled connection is used by at most one query at a time.
/// - Once closed, every query fails with [`QueryError::Closed`].
pub struct SqliteQueryable {
    /// Pooled connections.
    connections: Vec<Mutex<Connection>>,
    /// Round-robin cursor for connection selection.
    cursor: AtomicUsize,
    /// Set by [`Queryable::close`].
    closed: AtomicBool,
}

impl SqliteQueryable {
    /// Opens and pings a pool for `connection`, a path or `file:` URI.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Driver`] when a connection cannot be opened.
    pub fn open(connection: &str, options: SqliteOpenOptions) -> Result<Self, QueryError> {
        let pool_size = if is_memory(connection) { 1 } else { options.pool_size.max(1) };
        let mut connections = Vec::with_capacity(pool_size);
        for _ in 0 .. pool_size {
            let conn = Connection::open_with_flags(connection, options.flags())
                .map_err(driver_error)?;
            conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))
                .map_err(driver_error)?;
            conn.query_row("SELECT 1", [], |_| Ok(())).map_err(driver_error)?;
            connections.push(Mutex::new(conn));
        }
        Ok(Self::from_pool(connections))
    }

    /// Wraps an already-open connection.
    #[must_use]
    pub fn from_connection(connection: Connection) -> Self {
        Self::from_pool(vec![Mutex::new(connection)])
    }

    /// Returns the number of pooled connections.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.connections.len()
    }

    /// Builds the queryable from opened connections.
    fn from_pool(connections: Vec<Mutex<Connection>>) -> Self {
        Self {
            connections,
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Picks an idle connection starting at the cursor, or waits on the
    /// cursor's connection when all are busy.
    fn acquire(&self) -> MutexGuard<'_, Connection> {
        let len = self.connections.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        for offset in 0 .. len {
            if let Ok(guard) = self.connections[(start + offset) % len].try_lock() {
                return guard;
            }
        }
        self.connections[start].lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Queryable for SqliteQueryable {
    fn query(
        &self,
        ctx: &QueryContext,
        sql: &str,
        params: &[SqlValue],
        scan: &mut ScanFn<'_>,
    ) -> Result<(), QueryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueryError::Closed);
        }
        ctx.check()?;
        let bound = params.iter().map(bind_value).collect::<Result<Vec<_>, _>>()?;
        let mut conn = self.acquire();
        let watch = ctx.clone();
        let _ = conn.progress_handler(PROGRESS_INTERVAL_OPS, Some(move || watch.is_done()));
        let result = run_transaction(&mut conn, ctx, sql, &bound, scan);
        let _ = conn.progress_handler(PROGRESS_INTERVAL_OPS, None::<fn() -> bool>);
        result
    }

    fn close(&self) -> Result<(), QueryError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Runs one statement inside a transaction and scans its rows.
fn run_transaction(
    conn: &mut Connection,
    ctx: &QueryContext,
    sql: &str,
    params: &[Value],
    scan: &mut ScanFn<'_>,
) -> Result<(), QueryError> {
    let tx = conn.transaction().map_err(|err| execution_error(ctx, &err))?;
    {
        let mut stmt = tx.prepare(sql).map_err(|err| execution_error(ctx, &err))?;
        let columns: Vec<String> =
            stmt.column_names().into_iter().map(str::to_string).collect();
        let decl_types: Vec<Option<String>> = stmt
            .columns()
            .iter()
            .map(|column| column.decl_type().map(str::to_ascii_uppercase))
            .collect();
        let rows =
            stmt.query(params_from_iter(params.iter())).map_err(|err| execution_error(ctx, &err))?;
        let mut row_set = SqliteRowSet {
            columns,
            decl_types,
            rows,
            ctx,
        };
        scan(&mut row_set)?;
    }
    tx.commit().map_err(|err| execution_error(ctx, &err))
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Cursor over the rows of one prepared statement.
struct SqliteRowSet<'stmt, 'ctx> {
    /// Column names.
    columns: Vec<String>,
    /// Upper-cased declared column types.
    decl_types: Vec<Option<String>>,
    /// Live statement rows.
    rows: Rows<'stmt>,
    /// Execution context polled per row.
    ctx: &'ctx QueryContext,
}

impl RowSet for SqliteRowSet<'_, '_> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>, QueryError> {
        self.ctx.check()?;
        let ctx = self.ctx;
        let Some(row) = self.rows.next().map_err(|err| execution_error(ctx, &err))? else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(self.columns.len());
        for (index, decl_type) in self.decl_types.iter().enumerate() {
            let value = row.get_ref(index).map_err(|err| execution_error(ctx, &err))?;
            values.push(convert_value(value, decl_type.as_deref()));
        }
        Ok(Some(values))
    }
}

// ============================================================================
// SECTION: Conversion
// ============================================================================

/// Converts a raw `SQLite` value, honoring temporal declared types.
fn convert_value(value: ValueRef<'_>, decl_type: Option<&str>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(value) => SqlValue::Integer(value),
        ValueRef::Real(value) => SqlValue::Float(value),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            if decl_type.is_some_and(is_temporal_type)
                && let Some(timestamp) = parse_timestamp(&text)
            {
                return SqlValue::Timestamp(timestamp);
            }
            SqlValue::Text(text)
        }
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

/// Returns true for declared types that hold dates or times.
fn is_temporal_type(decl_type: &str) -> bool {
    decl_type.contains("DATE") || decl_type.contains("TIME")
}

/// Parses the text forms `SQLite` date functions produce, plus RFC 3339.
fn parse_timestamp(text: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(value.to_offset(UtcOffset::UTC));
    }
    let formats = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    ];
    for format in formats {
        if let Ok(value) = PrimitiveDateTime::parse(text, format) {
            return Some(value.assume_utc());
        }
    }
    Date::parse(text, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|date| date.midnight().assume_utc())
}

/// Converts a bound parameter to a `SQLite` value.
fn bind_value(value: &SqlValue) -> Result<Value, QueryError> {
    Ok(match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => Value::Integer(*value),
        SqlValue::Float(value) => Value::Real(*value),
        SqlValue::Text(value) => Value::Text(value.clone()),
        SqlValue::Blob(value) => Value::Blob(value.clone()),
        SqlValue::Timestamp(value) => Value::Text(
            value.format(&Rfc3339).map_err(|err| QueryError::Driver(err.to_string()))?,
        ),
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when `connection` names an in-memory database.
fn is_memory(connection: &str) -> bool {
    connection == ":memory:" || connection.contains("mode=memory") || connection == "file::memory:"
}

/// Maps an open-time failure.
fn driver_error(err: rusqlite::Error) -> QueryError {
    QueryError::Driver(err.to_string())
}

/// Maps an execution failure, preferring the context's cancellation reason.
fn execution_error(ctx: &QueryContext, err: &rusqlite::Error) -> QueryError {
    ctx.check().err().unwrap_or_else(|| QueryError::Driver(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
