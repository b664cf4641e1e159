// crates/sqlgate-core/src/queryable.rs
// ============================================================================
// Module: Queryable Interfaces
// Description: Minimal capability traits a backing store must satisfy.
// Purpose: Decouple handles and the router from any concrete driver.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A [`Queryable`] executes one statement inside a read transaction and hands
//! the rows to a scoped callback as a [`RowSet`]. Rows never outlive the call,
//! so a handle can guarantee its connection is not closed while they are read.
//! A [`Driver`] opens a [`Queryable`] from a connection string.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::context::QueryContext;
use crate::error::QueryError;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Callback that consumes the rows of one execution.
pub type ScanFn<'a> = dyn FnMut(&mut dyn RowSet) -> Result<(), QueryError> + 'a;

/// Forward-only cursor over the rows of an executing statement.
pub trait RowSet {
    /// Returns the column names in result order.
    fn columns(&self) -> &[String];

    /// Fetches the next row, or `None` once the statement is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the driver fails or the context is done.
    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>, QueryError>;
}

/// A live connection to one backing store.
pub trait Queryable: Send + Sync {
    /// Executes `sql` with `params` in a read transaction and passes the rows to
    /// `scan`. The transaction ends when `scan` returns.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when preparation, execution, or `scan` fails.
    fn query(
        &self,
        ctx: &QueryContext,
        sql: &str,
        params: &[SqlValue],
        scan: &mut ScanFn<'_>,
    ) -> Result<(), QueryError>;

    /// Releases the connection. Later queries fail with [`QueryError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the driver fails to close cleanly.
    fn close(&self) -> Result<(), QueryError>;
}

/// Opens [`Queryable`] connections for one driver name.
pub trait Driver: Send + Sync {
    /// Opens and pings a connection described by `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Driver`] when the connection cannot be opened.
    fn open(&self, connection: &str) -> Result<Box<dyn Queryable>, QueryError>;
}
