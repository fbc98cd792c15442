// crates/query-relay-client/src/client.rs
// ============================================================================
// Module: Relay Client
// Description: Blocking gateway client with typed result decoding.
// Purpose: Turn a serialized statement into a decoded value in one call.
// Dependencies: reqwest, url, query-relay-core
// ============================================================================

//! ## Overview
//! [`RelayClient`] posts [`ExecuteRequest`] envelopes to `POST /v1/execute`
//! and blocks until the gateway answers. Reads can be decoded straight into a
//! [`WireValue`] (or any [`FromWire`] type) against a [`TypeDescriptor`].
//!
//! Row shaping for typed reads:
//! - `list[T]` (optionally wrapped in `Optional`) takes every row.
//! - Any other descriptor takes zero or one row; zero rows yields null or the
//!   absence marker when the descriptor allows it.
//!
//! Security posture: gateway responses are untrusted; bodies are size-capped
//! and redirects are never followed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use query_relay_core::ApprovalContext;
use query_relay_core::CodecError;
use query_relay_core::DatabaseId;
use query_relay_core::ExecuteRequest;
use query_relay_core::ExecutionResult;
use query_relay_core::FromWire;
use query_relay_core::SerializedQuery;
use query_relay_core::TypeDescriptor;
use query_relay_core::TypeRegistry;
use query_relay_core::WireValue;
use query_relay_core::codec::decode;
use query_relay_core::codec::decode_missing;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use serde_json::Value;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default end-to-end request timeout. Writes wait on a human operator.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Maximum response body accepted from a gateway.
pub const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Longest error body echoed back into a [`ClientError::Status`].
const MAX_ERROR_ECHO_CHARS: usize = 512;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Client configuration.
#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    /// Gateway base URL, for example `http://127.0.0.1:8710`.
    pub endpoint: String,
    /// Database every request targets.
    pub database_id: DatabaseId,
    /// End-to-end request timeout.
    pub timeout: Duration,
    /// Response body cap in bytes.
    pub max_response_bytes: usize,
}

impl RelayClientConfig {
    /// Builds a configuration with default timeout and body cap.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, database_id: impl Into<DatabaseId>) -> Self {
        Self {
            endpoint: endpoint.into(),
            database_id: database_id.into(),
            timeout: DEFAULT_TIMEOUT,
            max_response_bytes: MAX_RESPONSE_BYTES,
        }
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Blocking gateway client.
///
/// # Invariants
/// - `execute_url` and `health_url` share the configured base.
/// - The registry is read-only once the client exists.
pub struct RelayClient {
    /// HTTP client without redirect support.
    http: Client,
    /// Resolved execution endpoint.
    execute_url: Url,
    /// Resolved health endpoint.
    health_url: Url,
    /// Target database.
    database_id: DatabaseId,
    /// Response body cap in bytes.
    max_response_bytes: usize,
    /// Registry resolving named descriptors.
    registry: Arc<TypeRegistry>,
}

impl RelayClient {
    /// Builds a client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the endpoint is not an absolute
    /// `http`/`https` URL or the HTTP client cannot be built.
    pub fn new(config: RelayClientConfig, registry: Arc<TypeRegistry>) -> Result<Self, ClientError> {
        let mut base = Url::parse(&config.endpoint)
            .map_err(|err| ClientError::Config(format!("invalid endpoint: {err}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "unsupported endpoint scheme: {}",
                base.scheme()
            )));
        }
        if base.query().is_some() || base.fragment().is_some() {
            return Err(ClientError::Config(
                "endpoint must not carry a query or fragment".to_string(),
            ));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let execute_url = base
            .join("v1/execute")
            .map_err(|err| ClientError::Config(format!("invalid endpoint: {err}")))?;
        let health_url = base
            .join("v1/health")
            .map_err(|err| ClientError::Config(format!("invalid endpoint: {err}")))?;
        let http = Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|err| ClientError::Config(format!("http client build failed: {err}")))?;
        Ok(Self {
            http,
            execute_url,
            health_url,
            database_id: config.database_id,
            max_response_bytes: config.max_response_bytes,
            registry,
        })
    }

    /// Returns the target database.
    #[must_use]
    pub const fn database_id(&self) -> &DatabaseId {
        &self.database_id
    }

    /// Checks that the gateway answers its health route.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport failures or a non-success status.
    pub fn health(&self) -> Result<(), ClientError> {
        let response = self
            .http
            .get(self.health_url.clone())
            .send()
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        self.read_success(response).map(|_| ())
    }

    /// Submits a raw request envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport failures, non-success statuses,
    /// or a response that is not an [`ExecutionResult`].
    pub fn submit(&self, request: &ExecuteRequest) -> Result<ExecutionResult, ClientError> {
        let body = serde_json::to_vec(request)
            .map_err(|err| ClientError::Protocol(format!("request encoding failed: {err}")))?;
        let response = self
            .http
            .post(self.execute_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        let bytes = self.read_success(response)?;
        let result: ExecutionResult = serde_json::from_slice(&bytes)
            .map_err(|err| ClientError::Protocol(format!("invalid execution result: {err}")))?;
        if !result.is_consistent() {
            return Err(ClientError::Protocol(
                "gateway reported an executed statement that was not approved".to_string(),
            ));
        }
        Ok(result)
    }

    /// Submits a serialized statement against the configured database.
    ///
    /// Writes need an approval context; the gateway refuses them otherwise.
    ///
    /// # Errors
    ///
    /// As [`RelayClient::submit`].
    pub fn execute(
        &self,
        query: &SerializedQuery,
        approval_context: Option<ApprovalContext>,
    ) -> Result<ExecutionResult, ClientError> {
        let request =
            ExecuteRequest::from_query(query, self.database_id.clone(), approval_context);
        self.submit(&request)
    }

    /// Runs a read and decodes its rows against `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::WriteNotFetchable`] for writes,
    /// [`ClientError::Execution`] when the gateway reports a failure, and
    /// [`ClientError::Codec`] or [`ClientError::TooManyRows`] when the rows do
    /// not fit the descriptor.
    pub fn fetch(
        &self,
        query: &SerializedQuery,
        descriptor: &TypeDescriptor,
    ) -> Result<WireValue, ClientError> {
        if query.write_intent() {
            return Err(ClientError::WriteNotFetchable(query.statement.keyword()));
        }
        let result = self.execute(query, None)?;
        if let Some(message) = result.error {
            return Err(ClientError::Execution(message));
        }
        if !result.executed {
            return Err(ClientError::Execution("statement did not execute".to_string()));
        }
        let rows = result
            .rows
            .ok_or_else(|| ClientError::Protocol("read result carried no rows".to_string()))?;
        decode_rows(&rows, descriptor, &self.registry)
    }

    /// Runs a read and converts the decoded value into `T`.
    ///
    /// # Errors
    ///
    /// As [`RelayClient::fetch`], plus [`ClientError::Codec`] when the value
    /// does not convert into `T`.
    pub fn fetch_as<T: FromWire>(
        &self,
        query: &SerializedQuery,
        descriptor: &TypeDescriptor,
    ) -> Result<T, ClientError> {
        let value = self.fetch(query, descriptor)?;
        Ok(T::from_wire(value)?)
    }

    /// Reads a success body, mapping other statuses to errors.
    fn read_success(&self, mut response: Response) -> Result<Vec<u8>, ClientError> {
        let status = response.status();
        let body = read_limited(&mut response, self.max_response_bytes)?;
        if status.is_success() {
            return Ok(body);
        }
        Err(ClientError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Decodes gateway rows against a descriptor.
///
/// # Errors
///
/// Returns [`ClientError::TooManyRows`] when a single-value descriptor meets
/// more than one row, otherwise [`ClientError::Codec`] for decode failures.
pub fn decode_rows(
    rows: &[Value],
    descriptor: &TypeDescriptor,
    registry: &TypeRegistry,
) -> Result<WireValue, ClientError> {
    if takes_all_rows(descriptor) {
        return Ok(decode(&Value::Array(rows.to_vec()), descriptor, registry)?);
    }
    match rows {
        [] => Ok(decode_missing(descriptor)?),
        [row] => Ok(decode(row, descriptor, registry)?),
        more => Err(ClientError::TooManyRows {
            count: more.len(),
        }),
    }
}

/// Returns true when the descriptor decodes the whole result set.
fn takes_all_rows(descriptor: &TypeDescriptor) -> bool {
    match descriptor {
        TypeDescriptor::ListOf(_) => true,
        TypeDescriptor::Optional(inner) => matches!(inner.as_ref(), TypeDescriptor::ListOf(_)),
        _ => false,
    }
}

// ============================================================================
// SECTION: HTTP Helpers
// ============================================================================

/// Reads a response body while enforcing a byte limit.
fn read_limited(response: &mut Response, max_bytes: usize) -> Result<Vec<u8>, ClientError> {
    let limit = u64::try_from(max_bytes)
        .map_err(|_| ClientError::Config("response size limit exceeds u64".to_string()))?;
    if let Some(expected) = response.content_length()
        && expected > limit
    {
        return Err(ClientError::ResponseTooLarge {
            limit: max_bytes,
        });
    }
    let mut buf = Vec::new();
    response
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|err| ClientError::Transport(format!("failed to read response: {err}")))?;
    if buf.len() > max_bytes {
        return Err(ClientError::ResponseTooLarge {
            limit: max_bytes,
        });
    }
    Ok(buf)
}

/// Extracts a readable message from an error body.
fn error_message(body: &[u8]) -> String {
    if let Ok(Value::Object(object)) = serde_json::from_slice::<Value>(body)
        && let Some(Value::String(message)) = object.get("error")
    {
        return message.chars().take(MAX_ERROR_ECHO_CHARS).collect();
    }
    String::from_utf8_lossy(body).chars().take(MAX_ERROR_ECHO_CHARS).collect()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Client failures.
///
/// # Invariants
/// - `Status` and `Execution` messages are gateway text and untrusted.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("client config error: {0}")]
    Config(String),
    /// Network or I/O failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Gateway answered with a non-success status.
    #[error("gateway returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Gateway error text.
        message: String,
    },
    /// Response did not follow the wire contract.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Response body exceeded the configured cap.
    #[error("gateway response exceeds {limit} bytes")]
    ResponseTooLarge {
        /// Cap in bytes.
        limit: usize,
    },
    /// Gateway reported an execution failure.
    #[error("execution failed: {0}")]
    Execution(String),
    /// Typed fetch was attempted for a mutating statement.
    #[error("{0} statements need approval; use execute instead of fetch")]
    WriteNotFetchable(&'static str),
    /// Single-value descriptor received several rows.
    #[error("expected at most one row, gateway returned {count}")]
    TooManyRows {
        /// Rows returned.
        count: usize,
    },
    /// Rows did not decode against the descriptor.
    #[error(transparent)]
    Codec(#[from] CodecError),
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
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use query_relay_core::Namespace;
    use query_relay_core::TypeDescriptor;
    use query_relay_core::TypeRegistry;
    use query_relay_core::WireValue;
    use serde_json::json;

    use super::ClientError;
    use super::decode_rows;
    use super::error_message;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .define("agreements", "Acceptance")
            .required("id", "int")
            .optional("signer_name", "Optional[str]")
            .finish()
            .unwrap();
        registry
    }

    fn descriptor(text: &str) -> TypeDescriptor {
        TypeDescriptor::parse(text, &Namespace::new("agreements")).unwrap()
    }

    #[test]
    fn zero_rows_against_optional_yield_null() {
        let value = decode_rows(&[], &descriptor("Optional[Acceptance]"), &registry()).unwrap();
        assert_eq!(value, WireValue::Null);
    }

    #[test]
    fn zero_rows_against_required_type_fail() {
        let err = decode_rows(&[], &descriptor("Acceptance"), &registry()).unwrap_err();
        assert!(matches!(err, ClientError::Codec(_)));
    }

    #[test]
    fn single_row_decodes_into_struct() {
        let rows = vec![json!({"id": 7})];
        let value = decode_rows(&rows, &descriptor("Optional[Acceptance]"), &registry()).unwrap();
        let WireValue::Struct(acceptance) = value else {
            panic!("expected struct");
        };
        assert_eq!(acceptance.get("id"), Some(&WireValue::Integer(7)));
        assert_eq!(acceptance.get("signer_name"), Some(&WireValue::Absent));
    }

    #[test]
    fn several_rows_against_single_value_fail() {
        let rows = vec![json!({"id": 1}), json!({"id": 2})];
        let err = decode_rows(&rows, &descriptor("Acceptance"), &registry()).unwrap_err();
        assert!(matches!(err, ClientError::TooManyRows { count: 2 }));
    }

    #[test]
    fn list_descriptors_take_every_row() {
        let rows = vec![json!({"id": 1}), json!({"id": 2})];
        let value = decode_rows(&rows, &descriptor("list[Acceptance]"), &registry()).unwrap();
        let WireValue::List(items) = value else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 2);
        let empty = decode_rows(&[], &descriptor("Optional[list[Acceptance]]"), &registry());
        assert_eq!(empty.unwrap(), WireValue::List(Vec::new()));
    }

    #[test]
    fn error_message_prefers_json_error_field() {
        assert_eq!(error_message(br#"{"error":"invalid request: x"}"#), "invalid request: x");
        assert_eq!(error_message(b"plain failure"), "plain failure");
        assert_eq!(error_message(&[b'a'; 2048]).len(), 512);
    }
}
