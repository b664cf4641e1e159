// crates/sqlgate-core/src/registry.rs
// ============================================================================
// Module: Source Registry
// Description: Ordered, append-only collection of source handles.
// Purpose: Resolve source names and sweep pending updates opportunistically.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The registry keeps handles in insertion order and never removes one.
//! Re-registering a name swaps the existing handle's connection instead of
//! inserting a second handle, so references held elsewhere stay valid.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::error::QueryError;
use crate::handle::SourceHandle;
use crate::handle::SourceOptions;
use crate::queryable::Queryable;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Ordered collection of source handles.
///
/// # Invariants
/// - Handles are never removed or reordered.
/// - Source names are unique.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    /// Handles in insertion order.
    handles: Mutex<Vec<Arc<SourceHandle>>>,
}

impl SourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every handle in insertion order after giving each a chance to
    /// install its pending update.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<SourceHandle>> {
        let handles = self.lock().clone();
        for handle in &handles {
            handle.try_apply_pending_update();
        }
        handles
    }

    /// Looks up a handle by source name.
    #[must_use]
    pub fn lookup(&self, source: &str) -> Option<Arc<SourceHandle>> {
        let handle = self.lock().iter().find(|handle| handle.source() == source).cloned()?;
        handle.try_apply_pending_update();
        Some(handle)
    }

    /// Returns the first registered handle.
    #[must_use]
    pub fn first(&self) -> Option<Arc<SourceHandle>> {
        self.lock().first().cloned()
    }

    /// Returns the number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when no source is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Registers `db` under `source`. An existing handle is swapped in place.
    /// Returns true when an existing handle was replaced.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Closed`] when the existing handle is closed.
    pub fn register(
        &self,
        source: &str,
        db: Box<dyn Queryable>,
        options: SourceOptions,
    ) -> Result<bool, QueryError> {
        let mut handles = self.lock();
        if let Some(existing) = handles.iter().find(|handle| handle.source() == source) {
            existing.swap(db, options)?;
            return Ok(true);
        }
        handles.push(Arc::new(SourceHandle::new(source, options, db)));
        Ok(false)
    }

    /// Closes every handle, returning the first failure after attempting all.
    ///
    /// # Errors
    ///
    /// Returns the first [`QueryError`] reported by a handle.
    pub fn close_all(&self) -> Result<(), QueryError> {
        let handles = self.lock().clone();
        let mut first_error = None;
        for handle in handles {
            if let Err(err) = handle.close() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Locks the handle list, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, Vec<Arc<SourceHandle>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
