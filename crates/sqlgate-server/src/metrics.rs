// crates/sqlgate-server/src/metrics.rs
// ============================================================================
// Module: Gateway Metrics
// Description: Injected counters for requests and errors.
// Purpose: Count traffic without process-wide state.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The HTTP layer reports every routed request and every failure to a
//! [`GatewayMetrics`] sink passed in at construction. [`NoopMetrics`] is the
//! default; [`CounterMetrics`] keeps in-memory counters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Serialize;

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Routed request classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestKind {
    /// HTML UI.
    Html,
    /// CSV export.
    Csv,
    /// Line-delimited JSON export.
    Json,
    /// Server metadata.
    Meta,
}

impl RequestKind {
    /// Every request kind in label order.
    pub const ALL: [Self; 4] = [Self::Html, Self::Csv, Self::Json, Self::Meta];

    /// Returns a stable label for the request kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Meta => "meta",
        }
    }

    /// Returns the counter slot.
    const fn index(self) -> usize {
        match self {
            Self::Html => 0,
            Self::Csv => 1,
            Self::Json => 2,
            Self::Meta => 3,
        }
    }
}

/// Failure classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Authentication or authorization failure.
    Auth,
    /// Client-side request error.
    BadRequest,
    /// Server-side failure outside query execution.
    Internal,
    /// Query execution failure.
    Query,
}

impl ErrorKind {
    /// Every error kind in label order.
    pub const ALL: [Self; 4] = [Self::Auth, Self::BadRequest, Self::Internal, Self::Query];

    /// Returns a stable label for the error kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::BadRequest => "bad_request",
            Self::Internal => "internal",
            Self::Query => "query",
        }
    }

    /// Returns the counter slot.
    const fn index(self) -> usize {
        match self {
            Self::Auth => 0,
            Self::BadRequest => 1,
            Self::Internal => 2,
            Self::Query => 3,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for gateway traffic.
pub trait GatewayMetrics: Send + Sync {
    /// Records a routed request.
    fn record_request(&self, kind: RequestKind);
    /// Records a failure.
    fn record_error(&self, kind: ErrorKind);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
pub struct NoopMetrics;

impl GatewayMetrics for NoopMetrics {
    fn record_request(&self, _kind: RequestKind) {}

    fn record_error(&self, _kind: ErrorKind) {}
}

// ============================================================================
// SECTION: Counters
// ============================================================================

/// Atomic in-memory counters.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    /// Request counters indexed by [`RequestKind`].
    requests: [AtomicU64; 4],
    /// Error counters indexed by [`ErrorKind`].
    errors: [AtomicU64; 4],
}

/// Point-in-time copy of [`CounterMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests by label.
    pub requests: BTreeMap<&'static str, u64>,
    /// Errors by label.
    pub errors: BTreeMap<&'static str, u64>,
}

impl CounterMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the request count for `kind`.
    #[must_use]
    pub fn requests(&self, kind: RequestKind) -> u64 {
        self.requests[kind.index()].load(Ordering::Relaxed)
    }

    /// Returns the error count for `kind`.
    #[must_use]
    pub fn errors(&self, kind: ErrorKind) -> u64 {
        self.errors[kind.index()].load(Ordering::Relaxed)
    }

    /// Copies every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: RequestKind::ALL
                .iter()
                .map(|kind| (kind.as_str(), self.requests(*kind)))
                .collect(),
            errors: ErrorKind::ALL.iter().map(|kind| (kind.as_str(), self.errors(*kind))).collect(),
        }
    }
}

impl GatewayMetrics for CounterMetrics {
    fn record_request(&self, kind: RequestKind) {
        self.requests[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, kind: ErrorKind) {
        self.errors[kind.index()].fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
