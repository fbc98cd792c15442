// crates/query-relay-client/tests/gateway_transport.rs
// ============================================================================
// Module: Client Transport Tests
// Description: Client behavior against scripted gateway responses.
// Purpose: Validate envelopes, typed decoding, and failure mapping over HTTP.
// ============================================================================

//! ## Overview
//! Each test starts a one-shot `tiny_http` server that records the request
//! it receives and answers with a scripted status and body.

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
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use query_relay_client::ClientError;
use query_relay_client::RelayClient;
use query_relay_client::RelayClientConfig;
use query_relay_core::ApprovalContext;
use query_relay_core::CodecError;
use query_relay_core::Entity;
use query_relay_core::Field;
use query_relay_core::FromWire;
use query_relay_core::Namespace;
use query_relay_core::SerializedQuery;
use query_relay_core::TypeDescriptor;
use query_relay_core::TypeRegistry;
use query_relay_core::WireValue;
use query_relay_core::query::Insert;
use query_relay_core::query::Select;
use query_relay_core::query::col;
use query_relay_core::query::lit;
use serde_json::Value;
use serde_json::json;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

struct Acceptance;

impl Entity for Acceptance {
    const ENTITY_TYPE: &'static str = "Acceptance";
    const TABLE: &'static str = "acceptance";
    const COLUMNS: &'static [&'static str] = &["id", "agreement_id", "signer_name"];
}

#[derive(Debug, PartialEq)]
struct AcceptanceRow {
    id: i64,
    agreement_id: String,
    signer_name: Field<Option<String>>,
}

impl FromWire for AcceptanceRow {
    fn from_wire(value: WireValue) -> Result<Self, CodecError> {
        let mut value = value.into_struct("agreements", "Acceptance")?;
        Ok(Self {
            id: value.take("id")?,
            agreement_id: value.take("agreement_id")?,
            signer_name: value.take("signer_name")?,
        })
    }
}

/// Request as seen by the scripted gateway.
struct Captured {
    method: String,
    url: String,
    body: String,
}

/// Serves one request with a scripted answer.
fn one_shot(status: u16, body: String) -> (SocketAddr, mpsc::Receiver<Captured>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        if let Ok(mut request) = server.recv() {
            let mut text = String::new();
            let _ = request.as_reader().read_to_string(&mut text);
            let _ = tx.send(Captured {
                method: request.method().to_string(),
                url: request.url().to_string(),
                body: text,
            });
            let header =
                Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let response = Response::from_string(body).with_status_code(status).with_header(header);
            let _ = request.respond(response);
        }
    });
    (addr, rx)
}

fn registry() -> Arc<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    registry
        .define("agreements", "Acceptance")
        .required("id", "int")
        .required("agreement_id", "str")
        .optional("signer_name", "Optional[str]")
        .finish()
        .unwrap();
    registry.validate().unwrap();
    Arc::new(registry)
}

fn client(endpoint: String) -> RelayClient {
    let mut config = RelayClientConfig::new(endpoint, "main");
    config.timeout = Duration::from_secs(10);
    RelayClient::new(config, registry()).unwrap()
}

fn by_agreement(agreement_id: &str) -> SerializedQuery {
    Select::<Acceptance>::new()
        .filter(col("agreement_id").eq(lit(agreement_id)))
        .serialize()
        .unwrap()
}

fn optional_acceptance() -> TypeDescriptor {
    TypeDescriptor::parse("Optional[Acceptance]", &Namespace::new("agreements")).unwrap()
}

fn read_result(rows: &Value) -> String {
    json!({"executed": true, "approved": null, "rows": rows, "error": null, "requestId": "req-1"})
        .to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn execute_posts_camel_case_envelope() {
    let (addr, captured) = one_shot(200, read_result(&json!([])));
    let query = by_agreement("X");
    let result = client(format!("http://{addr}")).execute(&query, None).unwrap();
    assert!(result.executed);
    assert_eq!(result.request_id.unwrap().as_str(), "req-1");

    let request = captured.recv().unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.url, "/v1/execute");
    let body: Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["sqlText"], json!(query.sql_text));
    assert_eq!(body["parameters"], json!({"p0": "X"}));
    assert_eq!(body["databaseId"], json!("main"));
    assert_eq!(body["writeIntent"], json!(false));
    assert_eq!(body["entityType"], json!("Acceptance"));
    assert!(body.get("approvalContext").is_none());
}

#[test]
fn fetch_decodes_single_row_with_absent_fields() {
    let rows = json!([{"id": 3, "agreement_id": "X"}]);
    let (addr, _captured) = one_shot(200, read_result(&rows));
    let row: Option<AcceptanceRow> = client(format!("http://{addr}"))
        .fetch_as(&by_agreement("X"), &optional_acceptance())
        .unwrap();
    assert_eq!(
        row,
        Some(AcceptanceRow {
            id: 3,
            agreement_id: "X".to_string(),
            signer_name: Field::Absent,
        })
    );
}

#[test]
fn fetch_of_no_rows_is_none() {
    let (addr, _captured) = one_shot(200, read_result(&json!([])));
    let row: Option<AcceptanceRow> = client(format!("http://{addr}"))
        .fetch_as(&by_agreement("missing"), &optional_acceptance())
        .unwrap();
    assert_eq!(row, None);
}

#[test]
fn withheld_rows_surface_as_execution_errors() {
    let body = json!({
        "executed": true,
        "approved": null,
        "rows": null,
        "error": "no sanitization policy for entity Acceptance",
        "requestId": "req-2"
    });
    let (addr, _captured) = one_shot(200, body.to_string());
    let err = client(format!("http://{addr}"))
        .fetch(&by_agreement("X"), &optional_acceptance())
        .unwrap_err();
    assert!(
        matches!(err, ClientError::Execution(ref message) if message.contains("sanitization"))
    );
}

#[test]
fn bad_request_status_carries_gateway_message() {
    let body = json!({"error": "invalid request: unknown field `token`"});
    let (addr, _captured) = one_shot(400, body.to_string());
    let err = client(format!("http://{addr}")).execute(&by_agreement("X"), None).unwrap_err();
    match err {
        ClientError::Status {
            status,
            message,
        } => {
            assert_eq!(status, 400);
            assert!(message.starts_with("invalid request"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn oversized_responses_are_refused() {
    let rows = json!([{"id": 1, "agreement_id": "x".repeat(4_096)}]);
    let (addr, _captured) = one_shot(200, read_result(&rows));
    let mut config = RelayClientConfig::new(format!("http://{addr}"), "main");
    config.max_response_bytes = 1_024;
    let client = RelayClient::new(config, registry()).unwrap();
    let err = client.execute(&by_agreement("X"), None).unwrap_err();
    assert!(matches!(err, ClientError::ResponseTooLarge { limit: 1_024 }));
}

#[test]
fn inconsistent_results_are_protocol_errors() {
    let body = json!({"executed": true, "approved": false, "rows": null, "error": null});
    let (addr, _captured) = one_shot(200, body.to_string());
    let err = client(format!("http://{addr}")).execute(&by_agreement("X"), None).unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[test]
fn rejected_writes_report_operator_decision() {
    let body = json!({"executed": false, "approved": false, "rows": null, "error": null});
    let (addr, captured) = one_shot(200, body.to_string());
    let insert = Insert::<Acceptance>::new().value("agreement_id", "X").serialize().unwrap();
    let context = ApprovalContext::new("backfill").describe("acceptance:new", "new acceptance");
    let result = client(format!("http://{addr}")).execute(&insert, Some(context)).unwrap();
    assert!(!result.executed);
    assert_eq!(result.approved, Some(false));

    let body: Value = serde_json::from_str(&captured.recv().unwrap().body).unwrap();
    assert_eq!(body["writeIntent"], json!(true));
    assert_eq!(body["approvalContext"]["reason"], json!("backfill"));
}

#[test]
fn fetch_refuses_writes_before_sending() {
    let client = client("http://127.0.0.1:9".to_string());
    let insert = Insert::<Acceptance>::new().value("agreement_id", "X").serialize().unwrap();
    let err = client.fetch(&insert, &optional_acceptance()).unwrap_err();
    assert!(matches!(err, ClientError::WriteNotFetchable("INSERT")));
}

#[test]
fn endpoint_path_prefix_is_preserved() {
    let (addr, captured) = one_shot(200, json!({"status": "ok"}).to_string());
    client(format!("http://{addr}/relay")).health().unwrap();
    let request = captured.recv().unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.url, "/relay/v1/health");
}

#[test]
fn non_http_endpoints_are_rejected() {
    let err = RelayClient::new(RelayClientConfig::new("ftp://gateway", "main"), registry())
        .err()
        .unwrap();
    assert!(matches!(err, ClientError::Config(_)));
}
