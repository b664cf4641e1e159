// crates/sqlgate-client/src/client.rs
// ============================================================================
// Module: Gateway Client
// Description: reqwest-based client for `/meta`, `/csv`, and `/json`.
// Purpose: Run queries against a gateway and decode the results.
// Dependencies: csv, reqwest, serde, serde_json, thiserror, url
// ============================================================================

//! ## Overview
//! The client resolves routes relative to the base URL, so a gateway mounted
//! under a route prefix is addressed by including the prefix in the base.
//! Redirects are not followed; the gateway only redirects browsers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Marker header identifying a non-browser caller.
const NO_BROWSERS_HEADER: &str = "sec-sqlgate";
/// Value sent with [`NO_BROWSERS_HEADER`].
const NO_BROWSERS_VALUE: &str = "ok";
/// Maximum response body accepted by the client.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;
/// Request timeout used by [`GatewayClient::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Client failures.
///
/// # Invariants
/// - `Status::message` is untrusted server text.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The base URL or client settings are invalid.
    #[error("client config error: {0}")]
    Config(String),
    /// The request could not be sent or the body could not be read.
    #[error("http error: {0}")]
    Http(String),
    /// The gateway answered with a non-success status.
    #[error("gateway returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// First line of the response body.
        message: String,
    },
    /// The response body did not decode.
    #[error("decode error: {0}")]
    Decode(String),
    /// The response body exceeds [`MAX_RESPONSE_BYTES`].
    #[error("response exceeds size limit ({actual} > {limit})")]
    ResponseTooLarge {
        /// Bytes read before giving up.
        actual: usize,
        /// Limit in bytes.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Gateway metadata from `/meta`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    /// Registered sources.
    pub sources: Vec<SourceInfo>,
    /// UI links.
    #[serde(default)]
    pub links: Vec<LinkInfo>,
    /// Query timeout in milliseconds; zero when unbounded.
    #[serde(default)]
    pub query_timeout_ms: u64,
}

/// One source described by `/meta`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceInfo {
    /// Source name.
    pub source: String,
    /// Human-readable label.
    pub label: String,
    /// Named queries by name.
    #[serde(default)]
    pub named: BTreeMap<String, String>,
}

/// One UI link described by `/meta`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkInfo {
    /// Anchor text.
    pub anchor: String,
    /// Link target.
    pub url: String,
}

/// `/meta` response envelope.
#[derive(Deserialize)]
struct MetaEnvelope {
    /// Metadata body.
    meta: ServerInfo,
}

/// Tabular result decoded from `/csv`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CsvRows {
    /// Column names.
    pub columns: Vec<String>,
    /// Rows of rendered cell text.
    pub rows: Vec<Vec<String>>,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Async gateway client.
///
/// # Invariants
/// - `base` has a path ending in `/`.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    /// HTTP client.
    http: Client,
    /// Base URL routes are resolved against.
    base: Url,
}

impl GatewayClient {
    /// Creates a client for the gateway at `base_url` with [`DEFAULT_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the URL is not `http` or `https`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Creates a client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the URL is invalid or the HTTP
    /// client cannot be built.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url)
            .map_err(|err| ClientError::Config(format!("invalid base url: {err}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "unsupported url scheme \"{}\"",
                base.scheme()
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        let http = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|err| ClientError::Config(err.to_string()))?;
        Ok(Self {
            http,
            base,
        })
    }

    /// Returns the base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    /// Fetches gateway metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport, status, or decode failures.
    pub async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        let body = self.fetch("meta", &[]).await?;
        let envelope: MetaEnvelope =
            serde_json::from_slice(&body).map_err(|err| ClientError::Decode(err.to_string()))?;
        Ok(envelope.meta)
    }

    /// Runs `sql` against `source` and returns the CSV rows.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport, status, or decode failures.
    pub async fn query(&self, source: &str, sql: &str) -> Result<CsvRows, ClientError> {
        let body = self.fetch("csv", &[("src", source), ("q", sql)]).await?;
        decode_csv(&body)
    }

    /// Runs `sql` against `source` and decodes each JSON row into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport, status, or decode failures.
    pub async fn query_json<T: DeserializeOwned>(
        &self,
        source: &str,
        sql: &str,
    ) -> Result<Vec<T>, ClientError> {
        let body = self.fetch("json", &[("src", source), ("q", sql)]).await?;
        decode_json_lines(&body)
    }

    /// Sends `GET route?params` and returns the success body.
    async fn fetch(&self, route: &str, params: &[(&str, &str)]) -> Result<Vec<u8>, ClientError> {
        let mut url = self
            .base
            .join(route)
            .map_err(|err| ClientError::Config(format!("invalid route: {err}")))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        let response = self
            .http
            .get(url)
            .header(NO_BROWSERS_HEADER, NO_BROWSERS_VALUE)
            .send()
            .await
            .map_err(|err| ClientError::Http(err.to_string()))?;
        let status = response.status();
        let body = read_body(response, MAX_RESPONSE_BYTES).await?;
        if status != StatusCode::OK {
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: first_line(&body),
            });
        }
        Ok(body)
    }
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Reads a response body, failing once it exceeds `limit` bytes.
async fn read_body(mut response: Response, limit: usize) -> Result<Vec<u8>, ClientError> {
    let mut body = Vec::new();
    while let Some(chunk) =
        response.chunk().await.map_err(|err| ClientError::Http(err.to_string()))?
    {
        let total = body.len().saturating_add(chunk.len());
        if total > limit {
            return Err(ClientError::ResponseTooLarge {
                actual: total,
                limit,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Returns the first line of an error body.
fn first_line(body: &[u8]) -> String {
    String::from_utf8_lossy(body).lines().next().unwrap_or_default().trim().to_string()
}

/// Decodes a CSV body with a header row.
fn decode_csv(body: &[u8]) -> Result<CsvRows, ClientError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(body);
    let columns = reader
        .headers()
        .map_err(|err| ClientError::Decode(err.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| ClientError::Decode(err.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(CsvRows {
        columns,
        rows,
    })
}

/// Decodes one JSON value per non-empty line.
fn decode_json_lines<T: DeserializeOwned>(body: &[u8]) -> Result<Vec<T>, ClientError> {
    let text = std::str::from_utf8(body).map_err(|err| ClientError::Decode(err.to_string()))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|err| ClientError::Decode(err.to_string())))
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
