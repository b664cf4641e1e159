// crates/sqlgate-core/src/value.rs
// ============================================================================
// Module: Result Values
// Description: Dynamically typed result cells and tabular query results.
// Purpose: Represent heterogeneous SQL rows independent of the backing driver.
// Dependencies: time
// ============================================================================

//! ## Overview
//! A result cell is a [`SqlValue`], a tagged variant over the scalar types any
//! backing store can produce. A [`QueryResult`] is the generic tabular output of
//! one execution and is immutable once handed to a renderer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use time::OffsetDateTime;

// ============================================================================
// SECTION: Values
// ============================================================================

/// One scalar cell of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes, possibly valid UTF-8.
    Blob(Vec<u8>),
    /// Point in time.
    Timestamp(OffsetDateTime),
}

impl SqlValue {
    /// Returns true for [`SqlValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text payload, if this is a text cell.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<OffsetDateTime> for SqlValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<Self>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Tabular output of one query execution.
///
/// # Invariants
/// - Every row has exactly `columns.len()` cells.
/// - `num_rows` is the number of rows fetched, which may exceed `rows.len()`
///   after display truncation.
/// - `more` is set when execution stopped at the row cap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Fetched rows.
    pub rows: Vec<Vec<SqlValue>>,
    /// Number of rows fetched by execution.
    pub num_rows: usize,
    /// Wall-clock execution time.
    pub elapsed: Duration,
    /// Set when `rows` was cut short for display.
    pub truncated: bool,
    /// Set when the source had more rows than the row cap admitted.
    pub more: bool,
}

impl QueryResult {
    /// Builds a complete result from columns and rows.
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        let num_rows = rows.len();
        Self {
            columns,
            rows,
            num_rows,
            elapsed: Duration::ZERO,
            truncated: false,
            more: false,
        }
    }

    /// Caps the visible rows at `max_rows`, preserving `num_rows`.
    pub fn truncate_display(&mut self, max_rows: usize) {
        if self.rows.len() > max_rows {
            self.rows.truncate(max_rows);
            self.truncated = true;
        }
    }
}
