// crates/sqlgate-client/tests/client.rs
// ============================================================================
// Module: Client Integration Tests
// Description: Client calls against a gateway bound to a loopback port.
// Purpose: Validate metadata, CSV, JSON decoding, and status errors end to end.
// Dependencies: rusqlite, sqlgate-client, sqlgate-server, tempfile, tokio
// ============================================================================

//! ## Overview
//! Each test serves a gateway over a seeded `SQLite` file on `127.0.0.1:0` and
//! drives it with [`GatewayClient`].

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use rusqlite::Connection;
use serde::Deserialize;
use sqlgate_client::ClientError;
use sqlgate_client::GatewayClient;
use sqlgate_config::SqlGateConfig;
use sqlgate_server::GatewayServer;
use sqlgate_store_sqlite::DriverRegistry;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// A gateway serving in the background.
struct Running {
    /// Base URL of the gateway.
    base: String,
    /// Triggers graceful shutdown.
    shutdown: oneshot::Sender<()>,
    /// Serve task.
    task: JoinHandle<()>,
    /// Keeps the database directory alive.
    _dir: TempDir,
}

impl Running {
    /// Stops the gateway and waits for the serve task.
    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.task.await.unwrap();
    }
}

/// Serves a gateway over a fruit table with `extra` config prepended.
async fn start(extra: &str) -> Running {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("fruit.db");
    Connection::open(&db)
        .unwrap()
        .execute_batch(
            "CREATE TABLE t (id INTEGER, value TEXT);
             INSERT INTO t VALUES (1, 'apple'), (2, 'pear, ripe');",
        )
        .unwrap();
    let toml = format!(
        "{extra}\n\n[[sources]]\nsource = \"main\"\nlabel = \"Fruit\"\ndriver = \"sqlite\"\nurl = \
         '{}'\n\n[sources.named]\ntotal = \"select count(*) n from t\"\n",
        db.display()
    );
    let config = SqlGateConfig::from_toml(&toml).unwrap();
    let server = Arc::new(GatewayServer::from_config(config, &DriverRegistry::default()).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, signal) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        server
            .serve(listener, async move {
                let _ = signal.await;
            })
            .await
            .unwrap();
        server.close().unwrap();
    });
    Running {
        base: format!("http://{addr}"),
        shutdown,
        task,
        _dir: dir,
    }
}

/// Row shape of the fruit table.
#[derive(Debug, Deserialize, PartialEq, Eq)]
struct Fruit {
    /// Row id.
    id: i64,
    /// Fruit name.
    value: String,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn server_info_lists_sources_and_timeout() {
    let running = start("[server]\nquery_timeout_ms = 1500").await;
    let client = GatewayClient::new(&running.base).unwrap();
    let info = client.server_info().await.unwrap();
    assert_eq!(info.query_timeout_ms, 1500);
    assert_eq!(info.sources.len(), 1);
    assert_eq!(info.sources[0].source, "main");
    assert_eq!(info.sources[0].label, "Fruit");
    assert_eq!(
        info.sources[0].named.get("total").map(String::as_str),
        Some("select count(*) n from t")
    );
    running.stop().await;
}

#[tokio::test]
async fn csv_query_decodes_quoted_cells() {
    let running = start("").await;
    let client = GatewayClient::new(&running.base).unwrap();
    let rows = client.query("main", "select id, value from t order by id").await.unwrap();
    assert_eq!(rows.columns, vec!["id", "value"]);
    assert_eq!(
        rows.rows,
        vec![
            vec!["1".to_string(), "apple".to_string()],
            vec!["2".to_string(), "pear, ripe".to_string()],
        ]
    );
    running.stop().await;
}

#[tokio::test]
async fn json_query_decodes_typed_rows() {
    let running = start("").await;
    let client = GatewayClient::new(&running.base).unwrap();
    let rows: Vec<Fruit> =
        client.query_json("main", "select id, value from t order by id").await.unwrap();
    assert_eq!(
        rows,
        vec![
            Fruit {
                id: 1,
                value: "apple".to_string(),
            },
            Fruit {
                id: 2,
                value: "pear, ripe".to_string(),
            },
        ]
    );
    running.stop().await;
}

#[tokio::test]
async fn error_status_carries_first_body_line() {
    let running = start("").await;
    let client = GatewayClient::new(&running.base).unwrap();
    let err = client.query("missing", "select 1").await.unwrap_err();
    match err {
        ClientError::Status {
            status,
            message,
        } => {
            assert_eq!(status, 400);
            assert_eq!(message, "unknown source \"missing\"");
        }
        other => panic!("unexpected error: {other}"),
    }
    running.stop().await;
}

#[tokio::test]
async fn route_prefix_is_part_of_the_base_url() {
    let running = start("[server]\nroute_prefix = \"/sql\"").await;
    let client = GatewayClient::new(&format!("{}/sql", running.base)).unwrap();
    let rows = client.query("main", "named:total").await.unwrap();
    assert_eq!(rows.rows, vec![vec!["2".to_string()]]);
    running.stop().await;
}
