// crates/query-relay-gateway/src/lib.rs
// ============================================================================
// Module: Query Relay Gateway Library
// Description: Server-side execution of serialized queries.
// Purpose: Run reads directly, gate writes behind approval, sanitize rows.
// Dependencies: query-relay-core, query-relay-config, axum, rusqlite, tokio
// ============================================================================

//! ## Overview
//! The gateway is the only component holding database access. Each request
//! moves `Received → (ReadExecuting | AwaitingApproval) → (Succeeded |
//! Rejected | Failed)`.
//!
//! Invariants:
//! - Rows leave the gateway only after every source table's sanitization policy ran.
//! - A write executes only after an operator approved it.
//! - Audit events carry SQL digests and parameter names, never values.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod approval;
pub mod audit;
pub mod classify;
pub mod database;
pub mod gateway;
pub mod sanitize;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use approval::ApprovalDecision;
pub use approval::ApprovalError;
pub use approval::ApprovalGate;
pub use approval::ApprovalRequest;
pub use approval::ApprovalSession;
pub use approval::ApprovalState;
pub use approval::Approver;
pub use approval::ChannelApprover;
pub use approval::DenyAllApprover;
pub use approval::PendingAnswer;
pub use approval::PendingApproval;
pub use approval::TerminalApprover;
pub use approval::approver_from_config;
pub use audit::ApprovalAuditEvent;
pub use audit::AuditSink;
pub use audit::ExecuteAuditEvent;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use classify::ClassifyError;
pub use classify::StatementClass;
pub use classify::classify;
pub use database::ColumnOrigin;
pub use database::Database;
pub use database::DatabaseCatalog;
pub use database::DatabaseError;
pub use database::QueryOutput;
pub use database::SqliteDatabase;
pub use gateway::Gateway;
pub use gateway::GatewayError;
pub use gateway::RequestState;
pub use sanitize::SanitizationPolicy;
pub use sanitize::SanitizeError;
pub use sanitize::SanitizerRegistry;
pub use server::GatewayServer;
pub use server::ServerError;
