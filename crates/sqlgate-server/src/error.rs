// crates/sqlgate-server/src/error.rs
// ============================================================================
// Module: Gateway Errors
// Description: Request-level error taxonomy and HTTP status mapping.
// Purpose: Give every failure exactly one status code and metric label.
// Dependencies: axum, sqlgate-core, thiserror
// ============================================================================

//! ## Overview
//! [`GatewayError`] is the single error type surfaced by the router and the
//! HTTP layer. Each variant maps to one HTTP status and one [`ErrorKind`].
//! Driver error text is passed through to callers; backends are assumed to be
//! operator controlled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use sqlgate_core::QueryError;
use thiserror::Error;

use crate::metrics::ErrorKind;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway failures.
///
/// # Invariants
/// - Messages never include connection strings or secret material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Invalid source or server configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Startup failure while opening sources or state.
    #[error("initialization failed: {0}")]
    Init(String),
    /// Identity checks are configured and the caller is not logged in.
    #[error("not logged in")]
    Unauthenticated,
    /// The caller may not query the requested source.
    #[error("{0}")]
    Unauthorized(String),
    /// The request lacks the non-browser header or access cookie.
    #[error("query access denied")]
    MissingMarker,
    /// The query text is malformed, oversized, or forbidden.
    #[error("{0}")]
    Validation(String),
    /// Unknown source or named query.
    #[error("{0}")]
    NotFound(String),
    /// Driver failure, including timeouts and cancellation.
    #[error("{0}")]
    Execution(String),
    /// The identity lookup itself failed.
    #[error("identity lookup failed: {0}")]
    Identity(String),
}

impl GatewayError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unauthorized(_) | Self::MissingMarker => StatusCode::FORBIDDEN,
            Self::Validation(_) | Self::NotFound(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Init(_) | Self::Execution(_) | Self::Identity(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the metric label for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated | Self::Unauthorized(_) | Self::Identity(_) => ErrorKind::Auth,
            Self::MissingMarker | Self::Validation(_) | Self::NotFound(_) => ErrorKind::BadRequest,
            Self::Execution(_) => ErrorKind::Query,
            Self::Config(_) | Self::Init(_) => ErrorKind::Internal,
        }
    }
}

impl From<QueryError> for GatewayError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Rejected(_) | QueryError::UnknownMeta(_) => {
                Self::Validation(err.to_string())
            }
            QueryError::NamedQueryNotFound(_) | QueryError::UnknownSource(_) => {
                Self::NotFound(err.to_string())
            }
            QueryError::Closed
            | QueryError::Cancelled
            | QueryError::DeadlineExceeded
            | QueryError::Driver(_) => Self::Execution(err.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), [(CONTENT_TYPE, "text/plain; charset=utf-8")], format!("{self}\n"))
            .into_response()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_errors_map_to_statuses() {
        let cases = [
            (QueryError::Rejected("x".to_string()), StatusCode::BAD_REQUEST),
            (QueryError::UnknownMeta("meta:x".to_string()), StatusCode::BAD_REQUEST),
            (QueryError::NamedQueryNotFound("n".to_string()), StatusCode::BAD_REQUEST),
            (QueryError::UnknownSource("s".to_string()), StatusCode::BAD_REQUEST),
            (QueryError::DeadlineExceeded, StatusCode::INTERNAL_SERVER_ERROR),
            (QueryError::Closed, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(GatewayError::from(err).status(), status);
        }
    }

    #[test]
    fn auth_errors_are_labelled_auth() {
        assert_eq!(GatewayError::Unauthenticated.kind(), ErrorKind::Auth);
        assert_eq!(GatewayError::Unauthorized("no".to_string()).kind(), ErrorKind::Auth);
        assert_eq!(GatewayError::MissingMarker.status(), StatusCode::FORBIDDEN);
    }
}
