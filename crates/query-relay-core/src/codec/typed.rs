// crates/query-relay-core/src/codec/typed.rs
// ============================================================================
// Module: Typed Conversions
// Description: ToWire/FromWire bridges between Rust types and WireValue.
// Purpose: Let payload types round-trip through StructValue without JSON code.
// Dependencies: bigdecimal, time, crate::codec::{value, wire}
// ============================================================================

//! ## Overview
//! Payload types implement [`ToWire`] and [`FromWire`] by reading and writing
//! their fields through [`StructValue::put`] and [`StructValue::take`].
//! [`Field`] models a field that may be omitted, distinct from `Option`,
//! which models a field that may be null.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bigdecimal::BigDecimal;
use time::Date;
use time::OffsetDateTime;

use crate::codec::value::StructValue;
use crate::codec::value::WireValue;
use crate::codec::wire::CodecError;

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Converts a Rust value into a [`WireValue`].
pub trait ToWire {
    /// Returns the wire representation.
    fn to_wire(&self) -> WireValue;
}

/// Reconstructs a Rust value from a decoded [`WireValue`].
pub trait FromWire: Sized {
    /// Converts the value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Validation`] when the value has the wrong kind.
    fn from_wire(value: WireValue) -> Result<Self, CodecError>;
}

// ============================================================================
// SECTION: Present-or-Absent Fields
// ============================================================================

/// Field that is either supplied or omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Field<T> {
    /// Field was not supplied.
    #[default]
    Absent,
    /// Field was supplied.
    Present(T),
}

impl<T> Field<T> {
    /// Returns true when the field was omitted.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns the supplied value, if any.
    #[must_use]
    pub const fn as_present(&self) -> Option<&T> {
        match self {
            Self::Absent => None,
            Self::Present(value) => Some(value),
        }
    }
}

impl<T: ToWire> ToWire for Field<T> {
    fn to_wire(&self) -> WireValue {
        match self {
            Self::Absent => WireValue::Absent,
            Self::Present(value) => value.to_wire(),
        }
    }
}

impl<T: FromWire> FromWire for Field<T> {
    fn from_wire(value: WireValue) -> Result<Self, CodecError> {
        if value.is_absent() {
            return Ok(Self::Absent);
        }
        T::from_wire(value).map(Self::Present)
    }
}

// ============================================================================
// SECTION: Struct Access
// ============================================================================

impl StructValue {
    /// Removes and converts a field; missing fields convert from absence.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Validation`] with the field path on mismatch.
    pub fn take<T: FromWire>(&mut self, field: &str) -> Result<T, CodecError> {
        let value = self.fields.remove(field).unwrap_or(WireValue::Absent);
        T::from_wire(value).map_err(|err| match err {
            CodecError::Validation {
                path,
                message,
            } => CodecError::Validation {
                path: format!("{}.{field}{}", self.name, path.trim_start_matches('$')),
                message,
            },
            other => other,
        })
    }

    /// Stores a field from a typed value.
    pub fn put<T: ToWire + ?Sized>(&mut self, field: impl Into<String>, value: &T) {
        self.fields.insert(field.into(), value.to_wire());
    }
}

impl WireValue {
    /// Unwraps a struct value of the given type.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Validation`] when the value is not that struct.
    pub fn into_struct(self, namespace: &str, name: &str) -> Result<StructValue, CodecError> {
        match self {
            Self::Struct(value) if value.is_type(namespace, name) => Ok(value),
            Self::Struct(value) => Err(CodecError::validation(
                "$",
                format!("expected {namespace}.{name}, found {}.{}", value.namespace, value.name),
            )),
            other => Err(kind_error(&format!("{namespace}.{name}"), &other)),
        }
    }
}

// ============================================================================
// SECTION: Scalar Implementations
// ============================================================================

/// Builds a wrong-kind validation error.
fn kind_error(expected: &str, found: &WireValue) -> CodecError {
    CodecError::validation("$", format!("expected {expected}, found {}", found.kind_label()))
}

/// Implements the typed bridges for a single-variant scalar.
macro_rules! scalar_wire {
    ($ty:ty, $variant:ident, $label:literal) => {
        impl ToWire for $ty {
            fn to_wire(&self) -> WireValue {
                WireValue::$variant(<$ty as Clone>::clone(self))
            }
        }

        impl FromWire for $ty {
            fn from_wire(value: WireValue) -> Result<Self, CodecError> {
                match value {
                    WireValue::$variant(inner) => Ok(inner),
                    other => Err(kind_error($label, &other)),
                }
            }
        }
    };
}

scalar_wire!(String, String, "str");
scalar_wire!(i64, Integer, "int");
scalar_wire!(bool, Bool, "bool");
scalar_wire!(BigDecimal, Decimal, "Decimal");
scalar_wire!(OffsetDateTime, DateTime, "datetime");
scalar_wire!(Date, Date, "date");

impl ToWire for f64 {
    fn to_wire(&self) -> WireValue {
        WireValue::Float(*self)
    }
}

impl FromWire for f64 {
    #[allow(clippy::cast_precision_loss, reason = "Integral JSON numbers widen to float.")]
    fn from_wire(value: WireValue) -> Result<Self, CodecError> {
        match value {
            WireValue::Float(inner) => Ok(inner),
            WireValue::Integer(inner) => Ok(inner as Self),
            other => Err(kind_error("float", &other)),
        }
    }
}

impl ToWire for str {
    fn to_wire(&self) -> WireValue {
        WireValue::String(self.to_string())
    }
}

impl ToWire for StructValue {
    fn to_wire(&self) -> WireValue {
        WireValue::Struct(self.clone())
    }
}

impl ToWire for WireValue {
    fn to_wire(&self) -> WireValue {
        self.clone()
    }
}

impl FromWire for WireValue {
    fn from_wire(value: WireValue) -> Result<Self, CodecError> {
        Ok(value)
    }
}

// ============================================================================
// SECTION: Container Implementations
// ============================================================================

impl<T: ToWire> ToWire for Option<T> {
    fn to_wire(&self) -> WireValue {
        self.as_ref().map_or(WireValue::Null, ToWire::to_wire)
    }
}

impl<T: FromWire> FromWire for Option<T> {
    fn from_wire(value: WireValue) -> Result<Self, CodecError> {
        match value {
            WireValue::Null => Ok(None),
            other => T::from_wire(other).map(Some),
        }
    }
}

impl<T: ToWire> ToWire for Vec<T> {
    fn to_wire(&self) -> WireValue {
        WireValue::List(self.iter().map(ToWire::to_wire).collect())
    }
}

impl<T: FromWire> FromWire for Vec<T> {
    fn from_wire(value: WireValue) -> Result<Self, CodecError> {
        let WireValue::List(items) = value else {
            return Err(kind_error("list", &value));
        };
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                T::from_wire(item).map_err(|err| match err {
                    CodecError::Validation {
                        path,
                        message,
                    } => CodecError::Validation {
                        path: format!("[{index}]{}", path.trim_start_matches('$')),
                        message,
                    },
                    other => other,
                })
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
