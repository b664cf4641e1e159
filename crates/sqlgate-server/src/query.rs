// crates/sqlgate-server/src/query.rs
// ============================================================================
// Module: Query Router
// Description: Resolves and executes queries against registered sources.
// Purpose: Bound, time, and log every execution without blocking the runtime.
// Dependencies: serde, sqlgate-core, sqlgate-store-sqlite, tokio, tracing
// ============================================================================

//! ## Overview
//! [`QueryRouter::execute`] answers `meta:` queries from registry state, then
//! resolves the source handle, applies the syntax guard, and runs the query on
//! the blocking pool under the handle's read lock. `named:` queries resolve
//! against the locked handle's named-query map. Execution stops at the row cap
//! and reports [`QueryOutcome::TooManyRows`] with the partial result. Finished
//! queries are written to the local query log in the background.
//!
//! Dropping the future returned by `execute` cancels the running query.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use sqlgate_core::LockedSource;
use sqlgate_core::NamedQueries;
use sqlgate_core::QueryContext;
use sqlgate_core::QueryError;
use sqlgate_core::QueryResult;
use sqlgate_core::RowSet;
use sqlgate_core::SourceHandle;
use sqlgate_core::SourceRegistry;
use sqlgate_core::SqlValue;
use sqlgate_core::check_length;
use sqlgate_core::check_syntax;
use sqlgate_store_sqlite::LocalQueryLog;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::GatewayError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix of introspection queries.
pub const META_PREFIX: &str = "meta:";
/// Prefix of named queries.
pub const NAMED_PREFIX: &str = "named:";
/// Meta query listing every named query.
pub const META_NAMED: &str = "meta:named";
/// Default row cap for one execution.
pub const DEFAULT_MAX_ROWS: usize = 10_000;
/// Longest query prefix written to the operational log.
const MAX_LOGGED_QUERY_BYTES: usize = 200;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Query as received from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Source name.
    pub source: String,
    /// Query text: literal SQL, `named:<id>`, or `meta:<what>`.
    pub text: String,
}

impl Query {
    /// Creates a query.
    #[must_use]
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// Pre-authorization hook that may reject or rewrite a query.
pub trait QueryCheck: Send + Sync {
    /// Checks `query`, returning the query to run.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] to reject the request.
    fn check(&self, query: Query) -> Result<Query, GatewayError>;
}

/// Enforces the query length budget.
#[derive(Debug, Clone, Copy)]
pub struct DefaultQueryCheck {
    /// Maximum query length in bytes.
    max_bytes: usize,
}

impl DefaultQueryCheck {
    /// Creates a check with the given byte budget.
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
        }
    }
}

impl QueryCheck for DefaultQueryCheck {
    fn check(&self, query: Query) -> Result<Query, GatewayError> {
        check_length(&query.text, self.max_bytes)?;
        Ok(query)
    }
}

/// Result of a successful execution.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Every row was read.
    Complete(QueryResult),
    /// The row cap was hit; the result holds the rows read so far.
    TooManyRows(QueryResult),
}

impl QueryOutcome {
    /// Returns the result, discarding the completion flag.
    #[must_use]
    pub fn into_result(self) -> QueryResult {
        match self {
            Self::Complete(result) | Self::TooManyRows(result) => result,
        }
    }

    /// Returns the result.
    #[must_use]
    pub const fn result(&self) -> &QueryResult {
        match self {
            Self::Complete(result) | Self::TooManyRows(result) => result,
        }
    }

    /// Returns true when the row cap was hit.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        matches!(self, Self::TooManyRows(_))
    }
}

/// Public description of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    /// Source name.
    pub source: String,
    /// Label.
    pub label: String,
    /// Named queries.
    pub named: NamedQueries,
}

/// What one blocking execution produced.
struct Execution {
    /// Outcome or error.
    outcome: Result<QueryOutcome, QueryError>,
    /// Query text after named-query resolution.
    resolved: String,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Routes queries to source handles.
///
/// # Invariants
/// - Queries against `local_source` are never written to the query log.
#[derive(Debug, Clone)]
pub struct QueryRouter {
    /// Registered sources.
    registry: Arc<SourceRegistry>,
    /// Optional query log.
    log: Option<Arc<LocalQueryLog>>,
    /// Source name under which the log is exported.
    local_source: Option<String>,
    /// Row cap.
    max_rows: usize,
    /// Per-query timeout.
    query_timeout: Option<Duration>,
}

impl QueryRouter {
    /// Creates a router over `registry` with default limits and no log.
    #[must_use]
    pub const fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            log: None,
            local_source: None,
            max_rows: DEFAULT_MAX_ROWS,
            query_timeout: None,
        }
    }

    /// Records executions in `log`; `local_source` names the log's own source.
    #[must_use]
    pub fn with_query_log(mut self, log: Arc<LocalQueryLog>, local_source: Option<String>) -> Self {
        self.log = Some(log);
        self.local_source = local_source;
        self
    }

    /// Sets the row cap.
    #[must_use]
    pub const fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Sets the per-query timeout; `None` or zero disables it.
    #[must_use]
    pub const fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Returns the row cap.
    #[must_use]
    pub const fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Returns the per-query timeout.
    #[must_use]
    pub const fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }

    /// Returns the first registered source name.
    #[must_use]
    pub fn default_source(&self) -> Option<String> {
        self.registry.first().map(|handle| handle.source().to_string())
    }

    /// Describes every registered source in registration order.
    #[must_use]
    pub fn sources(&self) -> Vec<SourceSummary> {
        self.registry
            .list()
            .iter()
            .map(|handle| SourceSummary {
                source: handle.source().to_string(),
                label: handle.label(),
                named: handle.named_queries().as_ref().clone(),
            })
            .collect()
    }

    /// Executes `query` on behalf of `caller` (empty when unidentified).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`] for unknown sources or named queries,
    /// [`GatewayError::Validation`] for rejected text or unknown meta queries,
    /// and [`GatewayError::Execution`] for driver failures and timeouts.
    pub async fn execute(&self, caller: &str, query: Query) -> Result<QueryOutcome, GatewayError> {
        if query.text.starts_with(META_PREFIX) {
            return Ok(QueryOutcome::Complete(self.answer_meta(&query.text)?));
        }
        let handle = self
            .registry
            .lookup(&query.source)
            .ok_or_else(|| QueryError::UnknownSource(query.source.clone()))?;
        check_syntax(&query.text)?;

        let ctx = QueryContext::with_timeout(self.query_timeout);
        let guard = ctx.cancel_on_drop();
        let max_rows = self.max_rows;
        let text = query.text.clone();
        let task = tokio::task::spawn_blocking(move || run(&handle, &ctx, &text, max_rows));
        let execution = task
            .await
            .map_err(|err| GatewayError::Execution(format!("query task failed: {err}")))?;
        guard.disarm();

        let elapsed = execution.outcome.as_ref().map_or(Duration::ZERO, |out| out.result().elapsed);
        match &execution.outcome {
            Ok(outcome) => info!(
                source = %query.source,
                query = %log_prefix(&execution.resolved),
                elapsed_us = duration_micros(elapsed),
                rows = outcome.result().num_rows,
                more = outcome.is_truncated(),
                "query executed"
            ),
            Err(err) => info!(
                source = %query.source,
                query = %log_prefix(&execution.resolved),
                error = %err,
                "query failed"
            ),
        }
        let outcome = execution.outcome?;
        self.record(caller, &query.source, execution.resolved, elapsed);
        Ok(outcome)
    }

    /// Answers an introspection query.
    fn answer_meta(&self, text: &str) -> Result<QueryResult, QueryError> {
        if text != META_NAMED {
            return Err(QueryError::UnknownMeta(text.to_string()));
        }
        let mut rows = Vec::new();
        for handle in self.registry.list() {
            let label = handle.label();
            for (name, sql) in handle.named_queries().iter() {
                rows.push(vec![
                    SqlValue::from(handle.source()),
                    SqlValue::from(label.as_str()),
                    SqlValue::from(name.as_str()),
                    SqlValue::from(sql.as_str()),
                ]);
            }
        }
        let columns = ["source", "label", "queryName", "sql"].map(str::to_string).to_vec();
        Ok(QueryResult::new(columns, rows))
    }

    /// Writes a finished query to the log in the background.
    fn record(&self, caller: &str, source: &str, resolved: String, elapsed: Duration) {
        let Some(log) = &self.log else {
            return;
        };
        if self.local_source.as_deref() == Some(source) {
            return;
        }
        let log = Arc::clone(log);
        let caller = caller.to_string();
        let source = source.to_string();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = log.log_query(&caller, &source, &resolved, elapsed) {
                warn!(source = %source, error = %err, "failed to record query");
            }
        });
    }
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Runs `text` against `handle` under its read lock.
fn run(handle: &SourceHandle, ctx: &QueryContext, text: &str, max_rows: usize) -> Execution {
    let start = Instant::now();
    let mut resolved = text.to_string();
    let outcome = handle.with_lock(|locked| {
        let sql = resolve_named(&locked, text)?;
        resolved = sql.to_string();
        collect(&locked, ctx, sql, max_rows, start)
    });
    Execution {
        outcome,
        resolved,
    }
}

/// Resolves a `named:` query against the locked handle.
fn resolve_named<'a>(locked: &LockedSource<'a>, text: &'a str) -> Result<&'a str, QueryError> {
    let Some(name) = text.strip_prefix(NAMED_PREFIX) else {
        return Ok(text);
    };
    let sql = locked
        .named_query(name)
        .ok_or_else(|| QueryError::NamedQueryNotFound(name.to_string()))?;
    debug!(source = locked.source(), name, "resolved named query");
    Ok(sql)
}

/// Reads up to `max_rows` rows, reading one more to detect truncation.
fn collect(
    locked: &LockedSource<'_>,
    ctx: &QueryContext,
    sql: &str,
    max_rows: usize,
    start: Instant,
) -> Result<QueryOutcome, QueryError> {
    let mut columns = Vec::new();
    let mut rows = Vec::new();
    let mut more = false;
    locked.query(ctx, sql, &[], &mut |set: &mut dyn RowSet| {
        columns = set.columns().to_vec();
        while let Some(row) = set.next_row()? {
            if rows.len() == max_rows {
                more = true;
                break;
            }
            rows.push(row);
        }
        Ok(())
    })?;
    let mut result = QueryResult::new(columns, rows);
    result.more = more;
    result.elapsed = start.elapsed();
    Ok(if more { QueryOutcome::TooManyRows(result) } else { QueryOutcome::Complete(result) })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns at most [`MAX_LOGGED_QUERY_BYTES`] of `text` on a char boundary.
fn log_prefix(text: &str) -> &str {
    if text.len() <= MAX_LOGGED_QUERY_BYTES {
        return text;
    }
    let mut end = MAX_LOGGED_QUERY_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[.. end]
}

/// Converts a duration to whole microseconds, saturating.
fn duration_micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions and helpers are permitted."
    )]

    use super::*;

    #[test]
    fn log_prefix_respects_char_boundaries() {
        let text = format!("{}é", "a".repeat(MAX_LOGGED_QUERY_BYTES - 1));
        assert_eq!(log_prefix(&text).len(), MAX_LOGGED_QUERY_BYTES - 1);
        assert_eq!(log_prefix("select 1"), "select 1");
    }

    #[test]
    fn default_check_enforces_length() {
        let check = DefaultQueryCheck::new(8);
        assert!(check.check(Query::new("main", "select 1")).is_ok());
        let err = check.check(Query::new("main", "select 10")).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_meta_query_is_rejected() {
        let router = QueryRouter::new(Arc::new(SourceRegistry::new()));
        let err = router.execute("", Query::new("", "meta:bogus")).await.unwrap_err();
        assert_eq!(err, GatewayError::Validation("unknown meta query \"meta:bogus\"".to_string()));
    }

    #[tokio::test]
    async fn unknown_source_is_not_found() {
        let router = QueryRouter::new(Arc::new(SourceRegistry::new()));
        let err = router.execute("", Query::new("nope", "select 1")).await.unwrap_err();
        assert_eq!(err, GatewayError::NotFound("unknown source \"nope\"".to_string()));
    }
}
