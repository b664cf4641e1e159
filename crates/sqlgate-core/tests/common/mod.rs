// crates/sqlgate-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: In-memory queryables for handle and registry tests.
// Purpose: Observe which connection served a query and when it was closed.
// Dependencies: sqlgate-core
// ============================================================================

//! ## Overview
//! [`MemoryQueryable`] answers every statement with a single `id` row naming
//! the connection. A gated instance blocks inside `query` until released, which
//! lets tests hold a handle's read lock across a concurrent swap.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;

use sqlgate_core::QueryContext;
use sqlgate_core::QueryError;
use sqlgate_core::Queryable;
use sqlgate_core::RowSet;
use sqlgate_core::ScanFn;
use sqlgate_core::SourceHandle;
use sqlgate_core::SqlValue;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Rows held in memory.
pub struct VecRowSet {
    /// Column names.
    columns: Vec<String>,
    /// Remaining rows.
    rows: std::vec::IntoIter<Vec<SqlValue>>,
}

impl RowSet for VecRowSet {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>, QueryError> {
        Ok(self.rows.next())
    }
}

/// Blocks a query until the test releases it.
pub struct Gate {
    /// Signalled once the query holds the handle's read lock.
    started: mpsc::Sender<()>,
    /// Waited on before rows are produced.
    release: Mutex<mpsc::Receiver<()>>,
}

/// Test-side ends of a [`Gate`].
pub struct GateControl {
    /// Receives a message once the query has started.
    pub started: mpsc::Receiver<()>,
    /// Sends the release signal.
    pub release: mpsc::Sender<()>,
}

/// Creates a gate and its control ends.
pub fn gate() -> (Gate, GateControl) {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    (
        Gate {
            started: started_tx,
            release: Mutex::new(release_rx),
        },
        GateControl {
            started: started_rx,
            release: release_tx,
        },
    )
}

/// Connection that reports its own id.
pub struct MemoryQueryable {
    /// Identifier returned in the `id` column.
    id: i64,
    /// Set once closed.
    closed: Arc<AtomicBool>,
    /// Optional gate held during `query`.
    gate: Option<Gate>,
}

impl MemoryQueryable {
    /// Creates an ungated connection and its close flag.
    pub fn new(id: i64) -> (Box<dyn Queryable>, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let db = Self {
            id,
            closed: Arc::clone(&closed),
            gate: None,
        };
        (Box::new(db), closed)
    }

    /// Creates a gated connection, its close flag, and the gate controls.
    pub fn gated(id: i64) -> (Box<dyn Queryable>, Arc<AtomicBool>, GateControl) {
        let closed = Arc::new(AtomicBool::new(false));
        let (gate, control) = gate();
        let db = Self {
            id,
            closed: Arc::clone(&closed),
            gate: Some(gate),
        };
        (Box::new(db), closed, control)
    }
}

impl Queryable for MemoryQueryable {
    fn query(
        &self,
        ctx: &QueryContext,
        _sql: &str,
        _params: &[SqlValue],
        scan: &mut ScanFn<'_>,
    ) -> Result<(), QueryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueryError::Closed);
        }
        if let Some(gate) = &self.gate {
            gate.started.send(()).map_err(|err| QueryError::Driver(err.to_string()))?;
            let release = gate.release.lock().map_err(|err| QueryError::Driver(err.to_string()))?;
            release.recv().map_err(|err| QueryError::Driver(err.to_string()))?;
        }
        ctx.check()?;
        let mut rows = VecRowSet {
            columns: vec!["id".to_string()],
            rows: vec![vec![SqlValue::Integer(self.id)]].into_iter(),
        };
        scan(&mut rows)
    }

    fn close(&self) -> Result<(), QueryError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Runs a query on `handle` and returns the connection id that answered.
pub fn query_id(handle: &SourceHandle) -> Result<i64, QueryError> {
    let mut id = None;
    handle.query(&QueryContext::new(), "select id", &[], &mut |rows| {
        if let Some(row) = rows.next_row()?
            && let Some(SqlValue::Integer(value)) = row.first()
        {
            id = Some(*value);
        }
        Ok(())
    })?;
    id.ok_or_else(|| QueryError::Driver("no id row".to_string()))
}
