// crates/sqlgate-core/src/error.rs
// ============================================================================
// Module: Query Errors
// Description: Error taxonomy shared by handles, drivers, and the router.
// Purpose: Give every failure on the query path a typed, matchable shape.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`QueryError`] is returned by every fallible operation in the core. Driver
//! messages are carried as opaque strings; callers decide how much of them to
//! surface.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while resolving or executing a query.
///
/// # Invariants
/// - Payloads never include connection strings or secret material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The handle's connection has been torn down.
    #[error("source handle is closed")]
    Closed,
    /// The query was cancelled by the caller.
    #[error("query cancelled")]
    Cancelled,
    /// The query ran past its deadline.
    #[error("query deadline exceeded")]
    DeadlineExceeded,
    /// The underlying driver reported a failure.
    #[error("{0}")]
    Driver(String),
    /// The query text was rejected before execution.
    #[error("query rejected: {0}")]
    Rejected(String),
    /// A `named:` query did not resolve.
    #[error("named query \"{0}\" not recognized")]
    NamedQueryNotFound(String),
    /// The requested source is not registered.
    #[error("unknown source \"{0}\"")]
    UnknownSource(String),
    /// A `meta:` query is not supported.
    #[error("unknown meta query \"{0}\"")]
    UnknownMeta(String),
}

impl QueryError {
    /// Returns true when the failure came from cancellation or a deadline.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Returns true when the failure is the caller's fault rather than the
    /// backend's.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Rejected(_)
                | Self::NamedQueryNotFound(_)
                | Self::UnknownSource(_)
                | Self::UnknownMeta(_)
        )
    }
}
