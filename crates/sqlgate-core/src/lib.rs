// crates/sqlgate-core/src/lib.rs
// ============================================================================
// Module: sqlgate Core Library
// Description: Query-execution core for the SQL gateway.
// Purpose: Handles, registry, value model, and query screening.
// Dependencies: thiserror, time, tracing
// ============================================================================

//! ## Overview
//! `sqlgate-core` holds the parts of the gateway that do not touch the network
//! or a concrete database: the [`SqlValue`] cell model, the [`Queryable`] and
//! [`Driver`] seams, the hot-swappable [`SourceHandle`], the append-only
//! [`SourceRegistry`], and the lexical syntax guard.
//!
//! Security posture: query text and driver output are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod error;
pub mod handle;
pub mod queryable;
pub mod registry;
pub mod syntax;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::CancelOnDrop;
pub use context::QueryContext;
pub use error::QueryError;
pub use handle::DEFAULT_LABEL;
pub use handle::LockedSource;
pub use handle::NamedQueries;
pub use handle::SourceHandle;
pub use handle::SourceOptions;
pub use handle::SwapOutcome;
pub use queryable::Driver;
pub use queryable::Queryable;
pub use queryable::RowSet;
pub use queryable::ScanFn;
pub use registry::SourceRegistry;
pub use syntax::DEFAULT_MAX_QUERY_BYTES;
pub use syntax::check_length;
pub use syntax::check_syntax;
pub use value::QueryResult;
pub use value::SqlValue;
