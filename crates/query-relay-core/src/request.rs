// crates/query-relay-core/src/request.rs
// ============================================================================
// Module: Gateway Wire Types
// Description: Execution request and result envelopes exchanged over HTTP.
// Purpose: Define the only shapes that cross the client/gateway boundary.
// Dependencies: serde, serde_json, crate::{identifiers, query, scalar}
// ============================================================================

//! ## Overview
//! A client sends an [`ExecuteRequest`] and receives an [`ExecutionResult`].
//! Field names are camelCase on the wire.
//!
//! Invariants:
//! - `approved` is `null` for reads and a boolean for writes.
//! - `executed: true` never appears together with `approved: false`.
//! - Rows in a result are already sanitized and codec-encoded.
//! - `entityType` names the decode target only; the gateway picks masks from
//!   the tables each result column was read from.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::DatabaseId;
use crate::identifiers::EntityType;
use crate::identifiers::RequestId;
use crate::query::SerializedQuery;
use crate::scalar::ScalarValue;

// ============================================================================
// SECTION: Request
// ============================================================================

/// Human-facing context shown to the operator for a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApprovalContext {
    /// Why the caller wants to mutate data.
    pub reason: String,
    /// Entity key to human-readable description.
    #[serde(default)]
    pub entity_descriptions: BTreeMap<String, String>,
}

impl ApprovalContext {
    /// Creates a context with no entity descriptions.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            entity_descriptions: BTreeMap::new(),
        }
    }

    /// Adds an entity description.
    #[must_use]
    pub fn describe(mut self, key: impl Into<String>, description: impl Into<String>) -> Self {
        self.entity_descriptions.insert(key.into(), description.into());
        self
    }
}

/// Statement submitted for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExecuteRequest {
    /// SQL text with named placeholders.
    pub sql_text: String,
    /// Bound parameter values.
    #[serde(default)]
    pub parameters: BTreeMap<String, ScalarValue>,
    /// Target database.
    pub database_id: DatabaseId,
    /// Caller-declared write intent.
    #[serde(default)]
    pub write_intent: bool,
    /// Operator-facing context; required for writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_context: Option<ApprovalContext>,
    /// Entity type the caller decodes returned rows into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
}

impl ExecuteRequest {
    /// Builds a request from a serialized query.
    #[must_use]
    pub fn from_query(
        query: &SerializedQuery,
        database_id: DatabaseId,
        approval_context: Option<ApprovalContext>,
    ) -> Self {
        Self {
            sql_text: query.sql_text.clone(),
            parameters: query.parameters.clone(),
            database_id,
            write_intent: query.write_intent(),
            approval_context,
            entity_type: Some(query.entity.clone()),
        }
    }

    /// Returns parameter names without values, for audit.
    #[must_use]
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.keys().cloned().collect()
    }
}

// ============================================================================
// SECTION: Result
// ============================================================================

/// Outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Statement reached the database and completed.
    pub executed: bool,
    /// Operator decision; `None` for reads.
    pub approved: Option<bool>,
    /// Encoded rows for reads.
    pub rows: Option<Vec<Value>>,
    /// Failure or rejection description.
    pub error: Option<String>,
    /// Rows changed by a write.
    #[serde(default)]
    pub rows_affected: Option<u64>,
    /// Gateway-issued request identifier.
    #[serde(default)]
    pub request_id: Option<RequestId>,
}

impl ExecutionResult {
    /// Read that completed with rows.
    #[must_use]
    pub const fn read(rows: Vec<Value>, request_id: RequestId) -> Self {
        Self {
            executed: true,
            approved: None,
            rows: Some(rows),
            error: None,
            rows_affected: None,
            request_id: Some(request_id),
        }
    }

    /// Approved write that completed.
    #[must_use]
    pub const fn written(rows_affected: u64, request_id: RequestId) -> Self {
        Self {
            executed: true,
            approved: Some(true),
            rows: None,
            error: None,
            rows_affected: Some(rows_affected),
            request_id: Some(request_id),
        }
    }

    /// Read that ran but whose rows were withheld.
    #[must_use]
    pub const fn withheld(error: String, request_id: RequestId) -> Self {
        Self {
            executed: true,
            approved: None,
            rows: None,
            error: Some(error),
            rows_affected: None,
            request_id: Some(request_id),
        }
    }

    /// Statement that did not execute.
    #[must_use]
    pub const fn not_executed(
        approved: Option<bool>,
        error: Option<String>,
        request_id: RequestId,
    ) -> Self {
        Self {
            executed: false,
            approved,
            rows: None,
            error,
            rows_affected: None,
            request_id: Some(request_id),
        }
    }

    /// Returns false for the forbidden `executed && approved == false` shape.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        !(self.executed && matches!(self.approved, Some(false)))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
