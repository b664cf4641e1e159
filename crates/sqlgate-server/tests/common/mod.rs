// crates/sqlgate-server/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Seeded databases, gateway configs, and in-process requests.
// Purpose: Drive the axum router without binding a socket.
// Dependencies: axum, http-body-util, rusqlite, sqlgate-config, tempfile, tower
// ============================================================================

//! ## Overview
//! Fixtures build small `SQLite` files under a [`TempDir`], render gateway
//! configs pointing at them, and send requests through
//! [`tower::ServiceExt::oneshot`].

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use rusqlite::Connection;
use sqlgate_config::SqlGateConfig;
use sqlgate_server::GatewayServer;
use sqlgate_store_sqlite::DriverRegistry;
use tempfile::TempDir;
use tower::ServiceExt;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Creates `fruit.db` with table `t(id INTEGER, value TEXT)` holding two rows.
pub fn fruit_db(dir: &TempDir) -> PathBuf {
    seed_db(dir.path(), "fruit.db", "CREATE TABLE t (id INTEGER, value TEXT);
         INSERT INTO t VALUES (1, 'apple'), (2, 'pear');")
}

/// Creates `name` in `dir` by running `setup`.
pub fn seed_db(dir: &Path, name: &str, setup: &str) -> PathBuf {
    let path = dir.join(name);
    let connection = Connection::open(&path).unwrap();
    connection.execute_batch(setup).unwrap();
    path
}

/// Returns a config with source `main` over `db` and the named query `total`.
pub fn fruit_config(db: &Path, extra: &str) -> SqlGateConfig {
    let toml = format!(
        "{extra}\n\n[[sources]]\nsource = \"main\"\nlabel = \"Fruit\"\ndriver = \
         \"sqlite\"\nurl = '{}'\n\n[sources.named]\ntotal = \"select count(*) n from t\"\n",
        db.display()
    );
    SqlGateConfig::from_toml(&toml).unwrap()
}

/// Builds a gateway over the fruit database with `extra` config prepended.
pub fn fruit_gateway(dir: &TempDir, extra: &str) -> GatewayServer {
    let db = fruit_db(dir);
    GatewayServer::from_config(fruit_config(&db, extra), &DriverRegistry::default()).unwrap()
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Buffered response.
pub struct TestResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body as text.
    pub body: String,
}

impl TestResponse {
    /// Returns a header value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Sends `GET uri` with `headers` through `app`.
pub async fn get(app: Router, uri: &str, headers: &[(&str, &str)]) -> TestResponse {
    let mut request = Request::builder().uri(uri);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    TestResponse {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

/// Sends `GET uri` as a non-browser client.
pub async fn get_api(app: Router, uri: &str) -> TestResponse {
    get(app, uri, &[("sec-sqlgate", "ok")]).await
}

/// Percent-encodes a query parameter value.
pub fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Polls `check` until it returns true or the timeout elapses.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0 .. 100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
