// crates/query-relay-client/src/lib.rs
// ============================================================================
// Module: Query Relay Client Library
// Description: Blocking HTTP client for the execution gateway.
// Purpose: Submit serialized statements and decode typed results.
// Dependencies: query-relay-core, reqwest, url
// ============================================================================

//! ## Overview
//! The client never holds database credentials. It ships a
//! [`query_relay_core::SerializedQuery`] to a gateway, waits for the full
//! [`query_relay_core::ExecutionResult`], and decodes returned rows against
//! the type descriptor the caller asked for.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod client;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use client::ClientError;
pub use client::DEFAULT_TIMEOUT;
pub use client::MAX_RESPONSE_BYTES;
pub use client::RelayClient;
pub use client::RelayClientConfig;
pub use client::decode_rows;
