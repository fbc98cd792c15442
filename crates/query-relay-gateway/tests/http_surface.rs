// crates/query-relay-gateway/tests/http_surface.rs
// ============================================================================
// Module: Gateway HTTP Surface Tests
// Description: Route, body limit, and error-shape checks over real sockets.
// Purpose: Validate the wire contract clients depend on.
// ============================================================================

//! HTTP-level tests for the gateway server.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use query_relay_config::QueryRelayConfig;
use query_relay_core::ExecutionResult;
use query_relay_gateway::DenyAllApprover;
use query_relay_gateway::Gateway;
use query_relay_gateway::GatewayServer;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

async fn start(max_body_bytes: usize) -> (tempfile::TempDir, SocketAddr) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("relay.db");
    let connection = rusqlite::Connection::open(&db_path).unwrap();
    connection
        .execute_batch(
            "CREATE TABLE agreement (id INTEGER PRIMARY KEY, title TEXT NOT NULL);
             INSERT INTO agreement VALUES (1, 'Master services');",
        )
        .unwrap();
    drop(connection);

    let text = format!(
        "[server]\nmax_body_bytes = {max_body_bytes}\n\n[approval]\nmode = \"deny_all\"\n\n\
         [audit]\nenabled = false\n\n[[databases]]\nid = \"main\"\npath = \"{}\"\n\n\
         [[sanitization]]\nentity_type = \"Agreement\"\npolicy = \"pass_through\"\n",
        db_path.display()
    );
    let config = QueryRelayConfig::from_toml(&text).unwrap();
    let gateway = Gateway::from_config(&config, Arc::new(DenyAllApprover)).unwrap();
    let server = GatewayServer::new(Arc::new(gateway), config.server.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve_on(listener));
    (dir, addr)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().timeout(Duration::from_secs(10)).build().unwrap()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn health_reports_ok() {
    let (_dir, addr) = start(64 * 1024).await;
    let response = client().get(format!("http://{addr}/v1/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"status": "ok"}));
}

#[tokio::test]
async fn execute_round_trips_camel_case_envelopes() {
    let (_dir, addr) = start(64 * 1024).await;
    let body = json!({
        "sqlText": "SELECT id, title FROM agreement WHERE id = :p0",
        "parameters": {"p0": 1},
        "databaseId": "main",
        "writeIntent": false,
        "entityType": "Agreement"
    });
    let response =
        client().post(format!("http://{addr}/v1/execute")).json(&body).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let result: ExecutionResult = response.json().await.unwrap();
    assert!(result.executed);
    assert_eq!(result.rows, Some(vec![json!({"id": 1, "title": "Master services"})]));
    assert!(result.request_id.is_some());
}

#[tokio::test]
async fn deny_all_rejects_writes_over_http() {
    let (_dir, addr) = start(64 * 1024).await;
    let body = json!({
        "sqlText": "DELETE FROM agreement WHERE id = :p0",
        "parameters": {"p0": 1},
        "databaseId": "main",
        "writeIntent": true,
        "approvalContext": {"reason": "cleanup", "entityDescriptions": {}}
    });
    let response =
        client().post(format!("http://{addr}/v1/execute")).json(&body).send().await.unwrap();
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["executed"], json!(false));
    assert_eq!(result["approved"], json!(false));
    assert_eq!(result["error"], json!(null));
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let (_dir, addr) = start(64 * 1024).await;
    let response = client()
        .post(format!("http://{addr}/v1/execute"))
        .header("content-type", "application/json")
        .body(r#"{"sqlText": "SELECT 1", "databaseId": "main", "token": "x"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("invalid request"));
}

#[tokio::test]
async fn oversized_bodies_are_refused() {
    let (_dir, addr) = start(256).await;
    let body = json!({
        "sqlText": format!("SELECT '{}'", "x".repeat(1_024)),
        "databaseId": "main"
    });
    let response =
        client().post(format!("http://{addr}/v1/execute")).json(&body).send().await.unwrap();
    assert_eq!(response.status(), 413);
}
