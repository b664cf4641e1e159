// crates/sqlgate-core/src/context.rs
// ============================================================================
// Module: Query Context
// Description: Deadline and cancellation state for one execution.
// Purpose: Let the request layer stop a blocking database call promptly.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A [`QueryContext`] travels with every execution. Drivers poll
//! [`QueryContext::check`] from inside the database call and between rows, so a
//! deadline or a client disconnect abandons the work instead of letting it run
//! to completion. [`CancelOnDrop`] ties cancellation to the lifetime of the
//! request future.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use crate::error::QueryError;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Deadline and cancellation flag shared between a request and its execution.
///
/// # Invariants
/// - Clones share one cancellation flag.
/// - Once cancelled, a context never becomes live again.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    /// Absolute deadline, if a timeout is configured.
    deadline: Option<Instant>,
    /// Shared cancellation flag.
    cancelled: Arc<AtomicBool>,
}

impl QueryContext {
    /// Creates a context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context whose deadline is `timeout` from now. A zero or absent
    /// timeout means no deadline.
    #[must_use]
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        let deadline = timeout
            .filter(|timeout| !timeout.is_zero())
            .and_then(|timeout| Instant::now().checked_add(timeout));
        Self {
            deadline,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Marks the context cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once [`QueryContext::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns true when the context is cancelled or past its deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Fails if the context is cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Cancelled`] or [`QueryError::DeadlineExceeded`].
    pub fn check(&self) -> Result<(), QueryError> {
        if self.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(QueryError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Returns a guard that cancels this context when dropped unless disarmed.
    #[must_use]
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            cancelled: Arc::clone(&self.cancelled),
            armed: true,
        }
    }
}

/// Cancels the owning context when dropped.
///
/// # Invariants
/// - A disarmed guard leaves the context untouched.
#[derive(Debug)]
pub struct CancelOnDrop {
    /// Flag shared with the context.
    cancelled: Arc<AtomicBool>,
    /// Whether dropping should cancel.
    armed: bool,
}

impl CancelOnDrop {
    /// Consumes the guard without cancelling.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.store(true, Ordering::Release);
        }
    }
}
