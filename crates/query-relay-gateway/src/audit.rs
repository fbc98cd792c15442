// crates/query-relay-gateway/src/audit.rs
// ============================================================================
// Module: Gateway Audit Logging
// Description: Structured audit events for execution and approval.
// Purpose: Emit redacted JSON-line audit records without a global logger.
// Dependencies: query-relay-core, serde
// ============================================================================

//! ## Overview
//! Every request emits one [`ExecuteAuditEvent`] at its terminal state and
//! every approval transition emits one [`ApprovalAuditEvent`]. Parameter
//! values never appear; statements are identified by their SHA-256 digest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use query_relay_config::AuditConfig;
use query_relay_core::HashDigest;
use serde::Serialize;

use crate::approval::ApprovalState;
use crate::gateway::RequestState;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Execution audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Gateway-issued request identifier.
    pub request_id: String,
    /// Target database identifier.
    pub database_id: String,
    /// Statement class label, when classification succeeded.
    pub statement: Option<&'static str>,
    /// Terminal request state.
    pub outcome: RequestState,
    /// Operator decision for writes.
    pub approved: Option<bool>,
    /// SHA-256 digest of the SQL text.
    pub sql_hash: HashDigest,
    /// Bound parameter names (values are never logged).
    pub parameter_names: Vec<String>,
    /// Rows returned by a read.
    pub rows_returned: Option<usize>,
    /// Rows changed by a write.
    pub rows_affected: Option<u64>,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
}

/// Inputs required to construct an execution audit event.
pub struct ExecuteAuditEventParams {
    /// Gateway-issued request identifier.
    pub request_id: String,
    /// Target database identifier.
    pub database_id: String,
    /// Statement class label.
    pub statement: Option<&'static str>,
    /// Terminal request state.
    pub outcome: RequestState,
    /// Operator decision for writes.
    pub approved: Option<bool>,
    /// SHA-256 digest of the SQL text.
    pub sql_hash: HashDigest,
    /// Bound parameter names.
    pub parameter_names: Vec<String>,
    /// Rows returned by a read.
    pub rows_returned: Option<usize>,
    /// Rows changed by a write.
    pub rows_affected: Option<u64>,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
}

/// Approval transition audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Request identifier the approval belongs to.
    pub request_id: String,
    /// State before the transition; `None` for the initial proposal.
    pub from: Option<ApprovalState>,
    /// State after the transition.
    pub to: ApprovalState,
    /// Canonical hash of the approval context (proposal only).
    pub context_hash: Option<HashDigest>,
    /// Failure detail for approver or execution errors.
    pub detail: Option<String>,
}

impl ExecuteAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: ExecuteAuditEventParams) -> Self {
        Self {
            event: "execute_request",
            timestamp_ms: now_ms(),
            request_id: params.request_id,
            database_id: params.database_id,
            statement: params.statement,
            outcome: params.outcome,
            approved: params.approved,
            sql_hash: params.sql_hash,
            parameter_names: params.parameter_names,
            rows_returned: params.rows_returned,
            rows_affected: params.rows_affected,
            error_kind: params.error_kind,
        }
    }
}

impl ApprovalAuditEvent {
    /// Creates a new approval transition event with a consistent timestamp.
    #[must_use]
    pub fn new(
        request_id: String,
        from: Option<ApprovalState>,
        to: ApprovalState,
        context_hash: Option<HashDigest>,
        detail: Option<String>,
    ) -> Self {
        Self {
            event: "approval_transition",
            timestamp_ms: now_ms(),
            request_id,
            from,
            to,
            context_hash,
            detail,
        }
    }
}

/// Returns milliseconds since the unix epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for gateway events.
pub trait AuditSink: Send + Sync {
    /// Record an execution event.
    fn record(&self, event: &ExecuteAuditEvent);

    /// Record an approval transition.
    fn record_approval(&self, _event: &ApprovalAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &ExecuteAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }

    fn record_approval(&self, event: &ApprovalAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized line.
    fn append<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &ExecuteAuditEvent) {
        self.append(event);
    }

    fn record_approval(&self, event: &ApprovalAuditEvent) {
        self.append(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &ExecuteAuditEvent) {}

    fn record_approval(&self, _event: &ApprovalAuditEvent) {}
}

/// Builds the configured audit sink.
///
/// # Errors
///
/// Returns an error when the audit file cannot be opened.
pub fn sink_from_config(config: &AuditConfig) -> io::Result<Arc<dyn AuditSink>> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => Ok(Arc::new(FileAuditSink::new(Path::new(path.trim()))?)),
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
