// crates/query-relay-core/src/codec/mod.rs
// ============================================================================
// Module: Result Codec
// Description: Type descriptors, registry, dynamic values, and wire encoding.
// Purpose: Group the decode-side type system used for the gateway return trip.
// Dependencies: crate::codec::{descriptor, registry, typed, value, wire}
// ============================================================================

//! ## Overview
//! Decoding flows descriptor string -> [`TypeDescriptor`] -> [`decode`]
//! against a [`TypeRegistry`] -> [`WireValue`] -> caller type via
//! [`FromWire`]. Encoding needs only the value.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod descriptor;
pub mod registry;
pub mod typed;
pub mod value;
pub mod wire;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use descriptor::DescriptorError;
pub use descriptor::ScalarKind;
pub use descriptor::TypeDescriptor;
pub use registry::ConstructHook;
pub use registry::FieldSchema;
pub use registry::RegistryError;
pub use registry::TypeRegistry;
pub use registry::TypeSchema;
pub use typed::Field;
pub use typed::FromWire;
pub use typed::ToWire;
pub use value::ABSENT;
pub use value::ABSENT_SENTINEL;
pub use value::AbsentMarker;
pub use value::Row;
pub use value::StructValue;
pub use value::WireValue;
pub use wire::CodecError;
pub use wire::decode;
pub use wire::decode_missing;
pub use wire::decode_with_descriptor;
pub use wire::encode;
pub use wire::encode_row;
