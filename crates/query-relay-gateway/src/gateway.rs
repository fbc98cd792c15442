// crates/query-relay-gateway/src/gateway.rs
// ============================================================================
// Module: Execution Gateway
// Description: Per-request execution state machine.
// Purpose: Execute reads, gate writes, sanitize and encode rows.
// Dependencies: query-relay-core, query-relay-config, tokio
// ============================================================================

//! ## Overview
//! [`Gateway::execute`] drives one request from `Received` to a terminal
//! state and always answers with an [`ExecutionResult`]. Malformed input,
//! backend failures, and approval outcomes are all reported in the result
//! rather than raised.
//!
//! Invariants:
//! - `executed: true` with `approved: false` is unrepresentable here: writes
//!   execute only after [`crate::approval::ApprovalSession::is_approved`].
//! - A caller-declared write intent can upgrade a read to a write, never the
//!   reverse.
//! - Error text may include the statement (placeholders only), never bound
//!   values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use query_relay_config::QueryRelayConfig;
use query_relay_core::CodecError;
use query_relay_core::DatabaseId;
use query_relay_core::ExecuteRequest;
use query_relay_core::ExecutionResult;
use query_relay_core::HashDigest;
use query_relay_core::RequestId;
use query_relay_core::codec::encode_row;
use query_relay_core::hash_bytes;
use serde::Serialize;
use thiserror::Error;

use crate::approval::ApprovalError;
use crate::approval::ApprovalGate;
use crate::approval::ApprovalRequest;
use crate::approval::ApprovalState;
use crate::approval::Approver;
use crate::audit::AuditSink;
use crate::audit::ExecuteAuditEvent;
use crate::audit::ExecuteAuditEventParams;
use crate::audit::sink_from_config;
use crate::classify::ClassifyError;
use crate::classify::StatementClass;
use crate::classify::classify;
use crate::database::Database;
use crate::database::DatabaseCatalog;
use crate::database::DatabaseError;
use crate::sanitize::SanitizeError;
use crate::sanitize::SanitizerRegistry;

// ============================================================================
// SECTION: Request State
// ============================================================================

/// Per-request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Request accepted, not yet classified.
    Received,
    /// Read running against the backend.
    ReadExecuting,
    /// Write waiting on the approval gate.
    AwaitingApproval,
    /// Statement completed.
    Succeeded,
    /// Write refused by the operator or the gate.
    Rejected,
    /// Parse, backend, or sanitization failure.
    Failed,
}

impl RequestState {
    /// Returns true when `next` is a legal successor.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Received,
                Self::ReadExecuting | Self::AwaitingApproval | Self::Rejected | Self::Failed
            ) | (Self::ReadExecuting, Self::Succeeded | Self::Failed)
                | (Self::AwaitingApproval, Self::Succeeded | Self::Rejected | Self::Failed)
        )
    }

    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ReadExecuting => "read_executing",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Succeeded => "succeeded",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway failures reported through [`ExecutionResult::error`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Statement text could not be classified.
    #[error("parse error: {0}")]
    Classify(#[from] ClassifyError),
    /// `databaseId` is not in the catalog.
    #[error("unknown database: {0}")]
    UnknownDatabase(DatabaseId),
    /// Write sent to a read-only database.
    #[error("database {0} is read-only")]
    ReadOnlyDatabase(DatabaseId),
    /// Backend rejected the statement.
    #[error("execution error: {0}")]
    Database(#[from] DatabaseError),
    /// Rows could not be sanitized.
    #[error("{0}")]
    Sanitize(#[from] SanitizeError),
    /// Rows could not be encoded.
    #[error("encode error: {0}")]
    Codec(#[from] CodecError),
    /// Approval gate failure.
    #[error("{0}")]
    Approval(#[from] ApprovalError),
    /// Blocking task did not complete.
    #[error("execution task failed: {0}")]
    Task(String),
    /// Internal state machine misuse.
    #[error("invalid request transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: RequestState,
        /// Requested state.
        to: RequestState,
    },
    /// Gateway could not be built.
    #[error("gateway init failed: {0}")]
    Init(String),
}

impl GatewayError {
    /// Returns a normalized kind label for audit output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Classify(_) => "parse_error",
            Self::UnknownDatabase(_) => "unknown_database",
            Self::ReadOnlyDatabase(_) => "read_only_database",
            Self::Database(_) => "execution_error",
            Self::Sanitize(_) => "sanitization_gap",
            Self::Codec(_) => "validation_error",
            Self::Approval(_) => "approval_error",
            Self::Task(_) => "task_error",
            Self::InvalidTransition {
                ..
            } => "internal_error",
            Self::Init(_) => "init_error",
        }
    }

    /// Renders the client-facing message; backend errors carry the statement.
    fn describe(&self, sql_text: &str) -> String {
        match self {
            Self::Database(_) => format!("{self} (statement: {sql_text})"),
            _ => self.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Gateway
// ============================================================================

/// Execution gateway shared by all in-flight requests.
pub struct Gateway {
    /// Database backends.
    catalog: DatabaseCatalog,
    /// Table-keyed sanitization policies.
    sanitizers: SanitizerRegistry,
    /// Approval gate for writes.
    approvals: ApprovalGate,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Next request sequence number.
    next_request: AtomicU64,
}

impl Gateway {
    /// Creates a gateway from its parts.
    #[must_use]
    pub fn new(
        catalog: DatabaseCatalog,
        sanitizers: SanitizerRegistry,
        approvals: ApprovalGate,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            catalog,
            sanitizers,
            approvals,
            audit,
            next_request: AtomicU64::new(1),
        }
    }

    /// Builds a gateway from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Init`] when configuration, audit, or database
    /// setup fails.
    pub fn from_config(
        config: &QueryRelayConfig,
        approver: Arc<dyn Approver>,
    ) -> Result<Self, GatewayError> {
        config.validate().map_err(|err| GatewayError::Init(err.to_string()))?;
        let audit =
            sink_from_config(&config.audit).map_err(|err| GatewayError::Init(err.to_string()))?;
        let catalog = DatabaseCatalog::from_config(&config.databases)
            .map_err(|err| GatewayError::Init(err.to_string()))?;
        let sanitizers = SanitizerRegistry::from_config(&config.sanitization);
        let approvals = ApprovalGate::new(
            approver,
            Duration::from_millis(config.approval.timeout_ms),
            Arc::clone(&audit),
        );
        Ok(Self::new(catalog, sanitizers, approvals, audit))
    }

    /// Executes one request to a terminal state.
    pub async fn execute(&self, request: ExecuteRequest) -> ExecutionResult {
        let request_id = RequestId::from_seq(self.next_request.fetch_add(1, Ordering::Relaxed));
        let mut trace = RequestTrace::begin(Arc::clone(&self.audit), request_id.clone(), &request);
        match self.dispatch(&request_id, &request, &mut trace).await {
            Ok((state, result)) => {
                trace.finish(state, &result, None);
                result
            }
            Err(err) => {
                let message = err.describe(&request.sql_text);
                let result = if matches!(err, GatewayError::Sanitize(_)) {
                    ExecutionResult::withheld(message, request_id)
                } else {
                    ExecutionResult::not_executed(trace.approved(), Some(message), request_id)
                };
                trace.finish(RequestState::Failed, &result, Some(err.kind()));
                result
            }
        }
    }

    /// Classifies the request and routes it to the read or write path.
    async fn dispatch(
        &self,
        request_id: &RequestId,
        request: &ExecuteRequest,
        trace: &mut RequestTrace,
    ) -> Result<(RequestState, ExecutionResult), GatewayError> {
        let class = if request.write_intent {
            classify(&request.sql_text)?;
            StatementClass::Write
        } else {
            classify(&request.sql_text)?
        };
        trace.class = Some(class);
        let database = self
            .catalog
            .get(&request.database_id)
            .ok_or_else(|| GatewayError::UnknownDatabase(request.database_id.clone()))?;
        match class {
            StatementClass::Read => self.read(request_id, request, database, trace).await,
            StatementClass::Write => self.write(request_id, request, database, trace).await,
        }
    }

    /// Runs a read and returns sanitized, encoded rows.
    async fn read(
        &self,
        request_id: &RequestId,
        request: &ExecuteRequest,
        database: Arc<dyn Database>,
        trace: &mut RequestTrace,
    ) -> Result<(RequestState, ExecutionResult), GatewayError> {
        trace.advance(RequestState::ReadExecuting)?;
        let sql = request.sql_text.clone();
        let parameters = request.parameters.clone();
        let output = tokio::task::spawn_blocking(move || database.query(&sql, &parameters))
            .await
            .map_err(|err| GatewayError::Task(err.to_string()))??;
        trace.rows_returned = Some(output.rows.len());
        let rows = self.sanitizers.sanitize(output)?;
        let encoded = rows.iter().map(encode_row).collect::<Result<Vec<_>, _>>()?;
        trace.advance(RequestState::Succeeded)?;
        Ok((RequestState::Succeeded, ExecutionResult::read(encoded, request_id.clone())))
    }

    /// Gates a write on approval and runs it when approved.
    async fn write(
        &self,
        request_id: &RequestId,
        request: &ExecuteRequest,
        database: Arc<dyn Database>,
        trace: &mut RequestTrace,
    ) -> Result<(RequestState, ExecutionResult), GatewayError> {
        let Some(context) = request.approval_context.clone() else {
            trace.advance(RequestState::Rejected)?;
            let error = "write requires approvalContext".to_string();
            return Ok((
                RequestState::Rejected,
                ExecutionResult::not_executed(Some(false), Some(error), request_id.clone()),
            ));
        };
        if database.read_only() {
            return Err(GatewayError::ReadOnlyDatabase(request.database_id.clone()));
        }
        trace.advance(RequestState::AwaitingApproval)?;
        let approval = ApprovalRequest {
            request_id: request_id.clone(),
            database_id: request.database_id.clone(),
            sql_text: request.sql_text.clone(),
            parameter_names: request.parameter_names(),
            context,
        };
        let session = self.approvals.review(&approval).await?;
        if !session.is_approved() {
            trace.advance(RequestState::Rejected)?;
            let error = match session.state() {
                ApprovalState::TimedOut => Some("approval timed out".to_string()),
                _ => session.detail().map(str::to_string),
            };
            return Ok((
                RequestState::Rejected,
                ExecutionResult::not_executed(Some(false), error, request_id.clone()),
            ));
        }
        trace.granted = true;
        let sql = request.sql_text.clone();
        let parameters = request.parameters.clone();
        let outcome = tokio::task::spawn_blocking(move || database.execute(&sql, &parameters))
            .await
            .map_err(|err| GatewayError::Task(err.to_string()))
            .and_then(|result| result.map_err(GatewayError::from));
        match outcome {
            Ok(rows_affected) => {
                session.executed()?;
                trace.rows_affected = Some(rows_affected);
                trace.advance(RequestState::Succeeded)?;
                Ok((
                    RequestState::Succeeded,
                    ExecutionResult::written(rows_affected, request_id.clone()),
                ))
            }
            Err(err) => {
                session.execution_failed(err.to_string())?;
                Err(err)
            }
        }
    }
}

// ============================================================================
// SECTION: Request Trace
// ============================================================================

/// Tracks request state and emits the single execution audit event.
///
/// A trace dropped before [`RequestTrace::finish`] records the request as
/// rejected with error kind `abandoned`.
struct RequestTrace {
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Request identifier.
    request_id: RequestId,
    /// Target database.
    database_id: DatabaseId,
    /// Digest of the SQL text.
    sql_hash: HashDigest,
    /// Bound parameter names.
    parameter_names: Vec<String>,
    /// Current state.
    state: RequestState,
    /// Statement class once known.
    class: Option<StatementClass>,
    /// Caller declared write intent.
    write_intent: bool,
    /// Operator approved the write.
    granted: bool,
    /// Rows returned by a read.
    rows_returned: Option<usize>,
    /// Rows changed by a write.
    rows_affected: Option<u64>,
    /// Audit event already emitted.
    finished: bool,
}

impl RequestTrace {
    /// Starts tracing a request in `Received`.
    fn begin(audit: Arc<dyn AuditSink>, request_id: RequestId, request: &ExecuteRequest) -> Self {
        Self {
            audit,
            request_id,
            database_id: request.database_id.clone(),
            sql_hash: hash_bytes(request.sql_text.as_bytes()),
            parameter_names: request.parameter_names(),
            state: RequestState::Received,
            class: None,
            write_intent: request.write_intent,
            granted: false,
            rows_returned: None,
            rows_affected: None,
            finished: false,
        }
    }

    /// Moves to `next`.
    fn advance(&mut self, next: RequestState) -> Result<(), GatewayError> {
        if !self.state.can_transition(next) {
            return Err(GatewayError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Returns the `approved` value for a result: `None` for reads.
    fn approved(&self) -> Option<bool> {
        let write = self.write_intent || self.class.is_some_and(StatementClass::is_write);
        write.then_some(self.granted)
    }

    /// Emits the audit event for a terminal state.
    fn finish(
        mut self,
        state: RequestState,
        result: &ExecutionResult,
        error_kind: Option<&'static str>,
    ) {
        self.state = state;
        self.emit(result.approved, error_kind);
    }

    /// Records the execution audit event once.
    fn emit(&mut self, approved: Option<bool>, error_kind: Option<&'static str>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.audit.record(&ExecuteAuditEvent::new(ExecuteAuditEventParams {
            request_id: self.request_id.as_str().to_string(),
            database_id: self.database_id.as_str().to_string(),
            statement: self.class.map(StatementClass::as_str),
            outcome: self.state,
            approved,
            sql_hash: self.sql_hash.clone(),
            parameter_names: std::mem::take(&mut self.parameter_names),
            rows_returned: self.rows_returned,
            rows_affected: self.rows_affected,
            error_kind,
        }));
    }
}

impl Drop for RequestTrace {
    fn drop(&mut self) {
        if !self.finished {
            self.state = RequestState::Rejected;
            let approved = self.approved();
            self.emit(approved, Some("abandoned"));
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
