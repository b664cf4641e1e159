// crates/sqlgate-core/src/handle.rs
// ============================================================================
// Module: Source Handle
// Description: Swappable binding between a source name and its connection.
// Purpose: Hot-swap connections without stalling or racing in-flight queries.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! A [`SourceHandle`] owns one source's live connection, label, and named
//! queries behind a reader/writer lock. Queries hold the read lock for the
//! whole execution. [`SourceHandle::swap`] only ever *tries* the write lock;
//! when a query is in flight the replacement is staged as the single pending
//! update and installed later by [`SourceHandle::try_apply_pending_update`].
//!
//! Lock order is state lock, then pending slot. The staging path takes the
//! pending slot alone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::sync::TryLockError;

use tracing::warn;

use crate::context::QueryContext;
use crate::error::QueryError;
use crate::queryable::Queryable;
use crate::queryable::ScanFn;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Label used when a source is configured without one.
pub const DEFAULT_LABEL: &str = "(unidentified database)";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Named-query map: short name to SQL text.
pub type NamedQueries = BTreeMap<String, String>;

/// Mutable presentation state installed together with a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    /// Human-readable label.
    pub label: String,
    /// Named queries exposed for the source.
    pub named: NamedQueries,
}

impl SourceOptions {
    /// Creates options with `label` and no named queries.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            named: NamedQueries::new(),
        }
    }

    /// Adds a named query.
    #[must_use]
    pub fn with_named(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.named.insert(name.into(), sql.into());
        self
    }
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL)
    }
}

/// Result of a [`SourceHandle::swap`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The new connection is active.
    Applied,
    /// The handle was busy; the connection waits as the pending update.
    Staged,
}

/// State guarded by the handle's reader/writer lock.
struct HandleState {
    /// Current label.
    label: String,
    /// Current named queries.
    named: Arc<NamedQueries>,
    /// Active connection; `None` once closed.
    db: Option<Box<dyn Queryable>>,
}

/// A staged replacement awaiting an idle moment.
struct PendingUpdate {
    /// Replacement connection.
    db: Box<dyn Queryable>,
    /// Replacement presentation state.
    options: SourceOptions,
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Live, swappable binding between a source name and its connection.
///
/// # Invariants
/// - At most one connection is active at a time.
/// - At most one pending update is staged; a newer one closes the older.
/// - The active connection is never closed while a read lock is held.
/// - The source name never changes.
pub struct SourceHandle {
    /// Source name.
    source: String,
    /// Active state.
    state: RwLock<HandleState>,
    /// Single-slot pending update.
    pending: Mutex<Option<PendingUpdate>>,
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandle").field("source", &self.source).finish_non_exhaustive()
    }
}

impl SourceHandle {
    /// Creates a handle owning `db`.
    #[must_use]
    pub fn new(source: impl Into<String>, options: SourceOptions, db: Box<dyn Queryable>) -> Self {
        Self {
            source: source.into(),
            state: RwLock::new(HandleState {
                label: options.label,
                named: Arc::new(options.named),
                db: Some(db),
            }),
            pending: Mutex::new(None),
        }
    }

    /// Returns the source name.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the current label.
    #[must_use]
    pub fn label(&self) -> String {
        self.read_state().label.clone()
    }

    /// Returns the current named queries.
    #[must_use]
    pub fn named_queries(&self) -> Arc<NamedQueries> {
        Arc::clone(&self.read_state().named)
    }

    /// Returns true once the handle has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.read_state().db.is_none()
    }

    /// Returns true when an update is staged.
    #[must_use]
    pub fn has_pending_update(&self) -> bool {
        self.lock_pending().is_some()
    }

    /// Runs `f` with the read lock held for its whole duration.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Closed`] when the handle is closed, or whatever `f`
    /// returns.
    pub fn with_lock<T, E>(&self, f: impl FnOnce(LockedSource<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<QueryError>,
    {
        let state = self.read_state();
        let Some(db) = state.db.as_deref() else {
            return Err(QueryError::Closed.into());
        };
        f(LockedSource {
            source: &self.source,
            label: &state.label,
            named: &state.named,
            db,
        })
    }

    /// Executes `sql` against the active connection under the read lock.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Closed`] when the handle is closed, or the driver's
    /// error.
    pub fn query(
        &self,
        ctx: &QueryContext,
        sql: &str,
        params: &[SqlValue],
        scan: &mut ScanFn<'_>,
    ) -> Result<(), QueryError> {
        self.with_lock(|locked| locked.query(ctx, sql, params, scan))
    }

    /// Replaces the connection and options without ever blocking.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Closed`] when the handle is already closed; `db` is
    /// closed in that case.
    pub fn swap(
        &self,
        db: Box<dyn Queryable>,
        options: SourceOptions,
    ) -> Result<SwapOutcome, QueryError> {
        let update = PendingUpdate {
            db,
            options,
        };
        match self.state.try_write() {
            Ok(mut state) => self.install(&mut state, update).map(|()| SwapOutcome::Applied),
            Err(TryLockError::Poisoned(poisoned)) => {
                let mut state = poisoned.into_inner();
                self.install(&mut state, update).map(|()| SwapOutcome::Applied)
            }
            Err(TryLockError::WouldBlock) => {
                self.stage(update);
                Ok(SwapOutcome::Staged)
            }
        }
    }

    /// Installs the pending update if the handle is idle. Returns true when an
    /// update was applied.
    pub fn try_apply_pending_update(&self) -> bool {
        if !self.has_pending_update() {
            return false;
        }
        let mut state = match self.state.try_write() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        let Some(update) = self.lock_pending().take() else {
            return false;
        };
        if state.db.is_none() {
            self.close_quietly(update.db.as_ref(), "discarded pending update");
            return false;
        }
        Self::replace(&self.source, &mut state, update);
        true
    }

    /// Closes the connection and any pending update. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the driver's error from closing the active connection. A second
    /// call always succeeds.
    pub fn close(&self) -> Result<(), QueryError> {
        let mut state = self.write_state();
        if let Some(update) = self.lock_pending().take() {
            self.close_quietly(update.db.as_ref(), "pending update on close");
        }
        let Some(db) = state.db.take() else {
            return Ok(());
        };
        db.close()
    }

    /// Installs `update` while holding the write lock.
    fn install(&self, state: &mut HandleState, update: PendingUpdate) -> Result<(), QueryError> {
        if state.db.is_none() {
            self.close_quietly(update.db.as_ref(), "swap on closed handle");
            return Err(QueryError::Closed);
        }
        if let Some(stale) = self.lock_pending().take() {
            self.close_quietly(stale.db.as_ref(), "superseded pending update");
        }
        Self::replace(&self.source, state, update);
        Ok(())
    }

    /// Stores `update` as the pending update, closing any older one.
    fn stage(&self, update: PendingUpdate) {
        let previous = self.lock_pending().replace(update);
        if let Some(previous) = previous {
            self.close_quietly(previous.db.as_ref(), "superseded pending update");
        }
    }

    /// Swaps the active state for `update` and closes the old connection.
    fn replace(source: &str, state: &mut HandleState, update: PendingUpdate) {
        state.label = update.options.label;
        state.named = Arc::new(update.options.named);
        if let Some(old) = state.db.replace(update.db)
            && let Err(err) = old.close()
        {
            warn!(source, error = %err, "closing replaced connection failed");
        }
    }

    /// Closes `db`, logging failures.
    fn close_quietly(&self, db: &dyn Queryable, reason: &str) {
        if let Err(err) = db.close() {
            warn!(source = %self.source, reason, error = %err, "closing connection failed");
        }
    }

    /// Acquires the read lock, recovering from poisoning.
    fn read_state(&self) -> RwLockReadGuard<'_, HandleState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the write lock, recovering from poisoning.
    fn write_state(&self) -> RwLockWriteGuard<'_, HandleState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the pending slot, recovering from poisoning.
    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingUpdate>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Locked View
// ============================================================================

/// Read-locked view of a handle, valid for the duration of
/// [`SourceHandle::with_lock`].
#[derive(Clone, Copy)]
pub struct LockedSource<'a> {
    /// Source name.
    source: &'a str,
    /// Label at lock time.
    label: &'a str,
    /// Named queries at lock time.
    named: &'a NamedQueries,
    /// Active connection.
    db: &'a dyn Queryable,
}

impl<'a> LockedSource<'a> {
    /// Returns the source name.
    #[must_use]
    pub const fn source(&self) -> &'a str {
        self.source
    }

    /// Returns the label.
    #[must_use]
    pub const fn label(&self) -> &'a str {
        self.label
    }

    /// Returns the named queries.
    #[must_use]
    pub const fn named_queries(&self) -> &'a NamedQueries {
        self.named
    }

    /// Looks up a named query.
    #[must_use]
    pub fn named_query(&self, name: &str) -> Option<&'a str> {
        self.named.get(name).map(String::as_str)
    }

    /// Executes `sql` on the locked connection.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn query(
        &self,
        ctx: &QueryContext,
        sql: &str,
        params: &[SqlValue],
        scan: &mut ScanFn<'_>,
    ) -> Result<(), QueryError> {
        self.db.query(ctx, sql, params, scan)
    }
}
