// crates/query-relay-core/src/lib.rs
// ============================================================================
// Module: Query Relay Core Library
// Description: Query serializer, result codec, type registry, and wire types.
// Purpose: Shared, transport-free building blocks for client and gateway.
// Dependencies: bigdecimal, serde, serde_json, serde_jcs, sha2, thiserror, time
// ============================================================================

//! ## Overview
//! Query Relay Core holds everything both sides of the relay agree on:
//! - [`query`] compiles entity-typed statements into [`SerializedQuery`].
//! - [`codec`] parses type descriptors, resolves them through a
//!   [`TypeRegistry`], and converts between JSON and [`WireValue`].
//! - [`request`] defines the HTTP envelopes.
//! - [`hashing`] fingerprints statements for audit without logging values.
//!
//! Invariants:
//! - Serialized SQL never contains literal values.
//! - Decode is all-or-nothing per value.
//! - The absence marker is a process-wide singleton.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod codec;
pub mod hashing;
pub mod identifiers;
pub mod query;
pub mod request;
pub mod scalar;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use codec::ABSENT;
pub use codec::ABSENT_SENTINEL;
pub use codec::AbsentMarker;
pub use codec::CodecError;
pub use codec::DescriptorError;
pub use codec::Field;
pub use codec::FromWire;
pub use codec::RegistryError;
pub use codec::Row;
pub use codec::ScalarKind;
pub use codec::StructValue;
pub use codec::ToWire;
pub use codec::TypeDescriptor;
pub use codec::TypeRegistry;
pub use codec::WireValue;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::hash_bytes;
pub use hashing::hash_canonical_json;
pub use identifiers::DatabaseId;
pub use identifiers::EntityType;
pub use identifiers::Namespace;
pub use identifiers::RequestId;
pub use identifiers::TypeName;
pub use query::Entity;
pub use query::QueryError;
pub use query::SerializedQuery;
pub use query::StatementKind;
pub use request::ApprovalContext;
pub use request::ExecuteRequest;
pub use request::ExecutionResult;
pub use scalar::ScalarValue;
