// crates/sqlgate-server/src/http.rs
// ============================================================================
// Module: HTTP Surface
// Description: axum routes for the HTML page, CSV, JSON, and metadata.
// Purpose: Admit requests, run them through the router, and encode results.
// Dependencies: axum, bytes, serde, sqlgate-config, tokio-stream, tower-http,
//               tracing, url
// ============================================================================

//! ## Overview
//! Every query route runs the same admission sequence: parse `src` and `q`,
//! apply the [`QueryCheck`](crate::query::QueryCheck), identify the caller, and
//! authorize the caller for the source. Only then does a route apply its own
//! marker rules and execute. Admission failures are plain-text responses with
//! the status from [`GatewayError::status`]; execution failures on the HTML
//! route render inline in the page.
//!
//! Security posture: browsers must present the same-site cookie (or the
//! non-browser header) before a query runs; `/json` accepts only the header.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::StatusCode;
use axum::http::header;
use axum::http::request::Parts;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use bytes::Bytes;
use serde::Serialize;
use sqlgate_config::LinkConfig;
use tower_http::compression::CompressionLayer;
use tracing::info;
use url::form_urlencoded;

use crate::auth::Caller;
use crate::auth::IdentityProvider;
use crate::auth::RequestInfo;
use crate::auth::SourceAuthorizer;
use crate::error::GatewayError;
use crate::metrics::ErrorKind;
use crate::metrics::GatewayMetrics;
use crate::metrics::RequestKind;
use crate::query::Query;
use crate::query::QueryCheck;
use crate::query::QueryOutcome;
use crate::query::QueryRouter;
use crate::query::SourceSummary;
use crate::render::RewriteRule;
use crate::render::json_lines;
use crate::render::to_csv;
use crate::render::to_display;
use crate::ui::UiPage;
use crate::ui::render_page;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header marking a non-browser request.
pub const NO_BROWSERS_HEADER: &str = "sec-sqlgate";
/// Name of the same-site access cookie.
pub const ACCESS_COOKIE_NAME: &str = "sqlgateQuery";
/// Value of the same-site access cookie.
const ACCESS_COOKIE_VALUE: &str = "1";
/// `Set-Cookie` value planting the access cookie.
const ACCESS_COOKIE: &str = "sqlgateQuery=1; SameSite=Lax; HttpOnly";
/// Content security policy for the HTML page.
const CONTENT_SECURITY_POLICY: &str = "default-src 'self'";

/// Returns the headers attached to every HTML page response, including the
/// redirect.
fn ui_headers() -> [(HeaderName, &'static str); 3] {
    [
        (header::SET_COOKIE, ACCESS_COOKIE),
        (header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY),
        (header::X_FRAME_OPTIONS, "DENY"),
    ]
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared state for HTTP handlers.
pub(crate) struct GatewayState {
    /// Query router.
    pub(crate) router: QueryRouter,
    /// Pre-authorization query hook.
    pub(crate) check: Arc<dyn QueryCheck>,
    /// Identity provider; `None` admits every caller anonymously.
    pub(crate) identity: Option<Arc<dyn IdentityProvider>>,
    /// Source authorizer.
    pub(crate) authorizer: Arc<dyn SourceAuthorizer>,
    /// Metrics sink.
    pub(crate) metrics: Arc<dyn GatewayMetrics>,
    /// Display rewrite rules in priority order.
    pub(crate) rules: Vec<RewriteRule>,
    /// UI links.
    pub(crate) links: Vec<LinkConfig>,
    /// Text shown for NULL cells.
    pub(crate) null_placeholder: String,
    /// Rows shown on the HTML page.
    pub(crate) max_display_rows: usize,
    /// Route prefix; empty or starting with `/`.
    pub(crate) route_prefix: String,
}

/// Builds the axum router over `state`.
pub(crate) fn build_router(state: Arc<GatewayState>, compression: bool) -> Router {
    let prefix = state.route_prefix.clone();
    let mut app = Router::new()
        .route(&format!("{prefix}/"), get(ui))
        .route(&format!("{prefix}/csv"), get(csv))
        .route(&format!("{prefix}/json"), get(json))
        .route(&format!("{prefix}/meta"), get(meta));
    if !prefix.is_empty() {
        app = app.route(&prefix, get(ui));
    }
    let app = app.fallback(not_found).with_state(state);
    if compression { app.layer(CompressionLayer::new()) } else { app }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Serves the HTML page.
async fn ui(State(state): State<Arc<GatewayState>>, parts: Parts) -> Response {
    state.metrics.record_request(RequestKind::Html);
    respond(&state, serve_ui(&state, &parts).await)
}

/// Serves CSV results.
async fn csv(State(state): State<Arc<GatewayState>>, parts: Parts) -> Response {
    state.metrics.record_request(RequestKind::Csv);
    respond(&state, serve_csv(&state, &parts).await)
}

/// Serves newline-delimited JSON results.
async fn json(State(state): State<Arc<GatewayState>>, parts: Parts) -> Response {
    state.metrics.record_request(RequestKind::Json);
    respond(&state, serve_json(&state, &parts).await)
}

/// Serves gateway metadata.
async fn meta(State(state): State<Arc<GatewayState>>, parts: Parts) -> Response {
    state.metrics.record_request(RequestKind::Meta);
    respond(&state, serve_meta(&state, &parts))
}

/// Answers unknown routes.
async fn not_found(State(state): State<Arc<GatewayState>>) -> Response {
    state.metrics.record_error(ErrorKind::BadRequest);
    (StatusCode::NOT_FOUND, "not found\n").into_response()
}

/// Converts a handler outcome, counting failures.
fn respond(state: &GatewayState, outcome: Result<Response, GatewayError>) -> Response {
    outcome.unwrap_or_else(|err| {
        state.metrics.record_error(err.kind());
        err.into_response()
    })
}

// ============================================================================
// SECTION: Routes
// ============================================================================

/// Renders the page, executing `q` when present.
async fn serve_ui(state: &GatewayState, parts: &Parts) -> Result<Response, GatewayError> {
    let Admitted {
        query,
        caller,
    } = admit(state, parts, true)?;
    if !query.text.is_empty() && !has_marker(&parts.headers, true) {
        let target = parts.uri.path_and_query().map_or("/", |target| target.as_str()).to_string();
        return Ok((StatusCode::FOUND, ui_headers(), [(header::LOCATION, target)]).into_response());
    }

    let sources = state.router.sources();
    let source = query.source.clone();
    let text = query.text.clone();
    let (display, error) = if text.is_empty() {
        (None, None)
    } else {
        match state.router.execute(caller_name(caller.as_ref()), query).await {
            Ok(outcome) => {
                let mut result = outcome.into_result();
                result.truncate_display(state.max_display_rows);
                (Some(to_display(&result, &state.null_placeholder, &state.rules)), None)
            }
            Err(err) => {
                state.metrics.record_error(ErrorKind::Query);
                (None, Some(err.to_string()))
            }
        }
    };
    let page = UiPage {
        route_prefix: &state.route_prefix,
        sources: &sources,
        source: &source,
        query: &text,
        links: &state.links,
        error: error.as_deref(),
        result: display.as_ref(),
    };
    Ok((ui_headers(), Html(render_page(&page))).into_response())
}

/// Executes `q` and encodes the result as CSV.
async fn serve_csv(state: &GatewayState, parts: &Parts) -> Result<Response, GatewayError> {
    let Admitted {
        query,
        caller,
    } = admit(state, parts, false)?;
    require_query(&query)?;
    if !has_marker(&parts.headers, true) {
        return Err(GatewayError::MissingMarker);
    }
    let result = execute(state, caller.as_ref(), query).await?;
    let body = to_csv(&result.into_result())?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], body).into_response())
}

/// Executes `q` and streams one JSON object per row.
async fn serve_json(state: &GatewayState, parts: &Parts) -> Result<Response, GatewayError> {
    let Admitted {
        query,
        caller,
    } = admit(state, parts, false)?;
    require_query(&query)?;
    if !has_marker(&parts.headers, false) {
        return Err(GatewayError::MissingMarker);
    }
    let result = execute(state, caller.as_ref(), query).await?;
    let lines = json_lines(result.into_result()).map(|line| line.map(Bytes::from));
    let body = Body::from_stream(tokio_stream::iter(lines));
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Describes sources, links, and the query timeout.
fn serve_meta(state: &GatewayState, parts: &Parts) -> Result<Response, GatewayError> {
    identify(state, parts)?;
    let timeout = state.router.query_timeout().unwrap_or_default();
    let body = MetaResponse {
        meta: MetaBody {
            sources: state.router.sources(),
            links: &state.links,
            query_timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        },
    };
    Ok(Json(body).into_response())
}

// ============================================================================
// SECTION: Admission
// ============================================================================

/// A request that passed the shared checks.
struct Admitted {
    /// Checked query.
    query: Query,
    /// Identified caller; `None` without an identity provider.
    caller: Option<Caller>,
}

/// Parses, checks, identifies, and authorizes a query request. With
/// `allow_empty`, an empty query skips authorization.
fn admit(state: &GatewayState, parts: &Parts, allow_empty: bool) -> Result<Admitted, GatewayError> {
    let query = state.check.check(query_params(state, parts))?;
    let caller = identify(state, parts)?;
    if !(allow_empty && query.text.is_empty()) {
        authorize(state, &query.source, caller.as_ref())?;
    }
    Ok(Admitted {
        query,
        caller,
    })
}

/// Reads `src` and `q`; the first occurrence of each wins.
fn query_params(state: &GatewayState, parts: &Parts) -> Query {
    let mut source = None;
    let mut text = None;
    let pairs = parts.uri.query().map(|raw| form_urlencoded::parse(raw.as_bytes()));
    for (key, value) in pairs.into_iter().flatten() {
        match key.as_ref() {
            "src" if source.is_none() => source = Some(value.into_owned()),
            "q" if text.is_none() => text = Some(value.into_owned()),
            _ => {}
        }
    }
    let source = source
        .filter(|source| !source.is_empty())
        .or_else(|| state.router.default_source())
        .unwrap_or_default();
    let text = text.as_deref().map(str::trim).unwrap_or_default();
    Query::new(source, text)
}

/// Identifies the caller when an identity provider is configured.
fn identify(state: &GatewayState, parts: &Parts) -> Result<Option<Caller>, GatewayError> {
    let Some(provider) = &state.identity else {
        return Ok(None);
    };
    let info = RequestInfo {
        peer: parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|connect| connect.0),
        headers: parts.headers.clone(),
    };
    provider.identify(&info)?.map(Some).ok_or(GatewayError::Unauthenticated)
}

/// Authorizes an identified caller for `source`.
fn authorize(state: &GatewayState, source: &str, caller: Option<&Caller>) -> Result<(), GatewayError> {
    let Some(caller) = caller else {
        return Ok(());
    };
    state.authorizer.authorize(source, caller).inspect_err(|err| {
        info!(source, caller = caller.name(), error = %err, "authorization denied");
    })
}

/// Rejects an empty query.
fn require_query(query: &Query) -> Result<(), GatewayError> {
    if query.text.is_empty() {
        return Err(GatewayError::Validation("no query provided".to_string()));
    }
    Ok(())
}

/// Returns true when the request carries the non-browser header, or the access
/// cookie if `cookie_ok`.
fn has_marker(headers: &HeaderMap, cookie_ok: bool) -> bool {
    if headers.contains_key(NO_BROWSERS_HEADER) {
        return true;
    }
    cookie_ok
        && headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(name, value)| name == ACCESS_COOKIE_NAME && value == ACCESS_COOKIE_VALUE)
}

/// Runs `query` for `caller`.
async fn execute(
    state: &GatewayState,
    caller: Option<&Caller>,
    query: Query,
) -> Result<QueryOutcome, GatewayError> {
    state.router.execute(caller_name(caller), query).await
}

/// Returns the caller name recorded in the query log.
fn caller_name(caller: Option<&Caller>) -> &str {
    caller.map_or("", Caller::name)
}

// ============================================================================
// SECTION: Metadata
// ============================================================================

/// `/meta` response envelope.
#[derive(Serialize)]
struct MetaResponse<'a> {
    /// Metadata body.
    meta: MetaBody<'a>,
}

/// `/meta` response body.
#[derive(Serialize)]
struct MetaBody<'a> {
    /// Registered sources.
    sources: Vec<SourceSummary>,
    /// UI links.
    links: &'a [LinkConfig],
    /// Query timeout in milliseconds; zero when unbounded.
    query_timeout_ms: u64,
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

    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn cookie_marker_requires_exact_pair() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("a=b; sqlgateQuery=1"));
        assert!(has_marker(&headers, true));
        assert!(!has_marker(&headers, false));
        headers.insert(header::COOKIE, HeaderValue::from_static("sqlgateQuery=0"));
        assert!(!has_marker(&headers, true));
    }

    #[test]
    fn header_marker_accepts_any_value() {
        let mut headers = HeaderMap::new();
        headers.insert(NO_BROWSERS_HEADER, HeaderValue::from_static("ok"));
        assert!(has_marker(&headers, false));
    }
}
