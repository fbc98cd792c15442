// crates/query-relay-core/src/codec/value.rs
// ============================================================================
// Module: Wire Values
// Description: Dynamic value model, struct values, and the absence marker.
// Purpose: Represent decoded results independently of any caller type system.
// Dependencies: bigdecimal, time
// ============================================================================

//! ## Overview
//! [`WireValue`] is the in-memory form the wire codec encodes from and
//! decodes into. It distinguishes an explicit `null` ([`WireValue::Null`])
//! from a field that was never supplied ([`WireValue::Absent`]).
//!
//! The absence marker is a single process-wide value ([`ABSENT`]); it is
//! never allocated per decode, so identity checks made by callers stay valid.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use time::Date;
use time::OffsetDateTime;

use crate::identifiers::Namespace;
use crate::identifiers::TypeName;

// ============================================================================
// SECTION: Absence Marker
// ============================================================================

/// Reserved wire string standing in for an absent value.
///
/// Unit-separator bytes never appear in ordinary payload text, so collisions
/// require deliberately crafted input.
pub const ABSENT_SENTINEL: &str = "\u{1f}query-relay:unset\u{1f}";

/// Marker meaning "field was not supplied", distinct from null.
///
/// # Invariants
/// - Only one instance exists per process: [`ABSENT`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct AbsentMarker {
    /// Prevents construction outside this module.
    _private: (),
}

/// The process-wide absence marker.
pub static ABSENT: AbsentMarker = AbsentMarker {
    _private: (),
};

impl AbsentMarker {
    /// Returns the canonical marker instance.
    #[must_use]
    pub fn get() -> &'static Self {
        &ABSENT
    }

    /// Returns the reserved sentinel string used on the wire.
    #[must_use]
    pub const fn sentinel() -> &'static str {
        ABSENT_SENTINEL
    }
}

// ============================================================================
// SECTION: Wire Values
// ============================================================================

/// Dynamically typed value carried through the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Explicit null.
    Null,
    /// Field was not supplied.
    Absent,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Finite float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Arbitrary-precision decimal.
    Decimal(BigDecimal),
    /// Date-time with offset.
    DateTime(OffsetDateTime),
    /// Calendar date.
    Date(Date),
    /// Ordered list.
    List(Vec<WireValue>),
    /// Registered struct instance.
    Struct(StructValue),
}

impl WireValue {
    /// Returns true for the absence marker.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns the process-wide absence marker when this value is absent.
    #[must_use]
    pub fn absent_marker(&self) -> Option<&'static AbsentMarker> {
        self.is_absent().then(AbsentMarker::get)
    }

    /// Returns a short kind label for diagnostics.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Absent => "absent",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "str",
            Self::Decimal(_) => "Decimal",
            Self::DateTime(_) => "datetime",
            Self::Date(_) => "date",
            Self::List(_) => "list",
            Self::Struct(_) => "struct",
        }
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<StructValue> for WireValue {
    fn from(value: StructValue) -> Self {
        Self::Struct(value)
    }
}

/// Untyped result row keyed by column name.
pub type Row = BTreeMap<String, WireValue>;

// ============================================================================
// SECTION: Struct Values
// ============================================================================

/// Instance of a registered struct type.
///
/// # Invariants
/// - After decode, every declared field is present in `fields`; omitted
///   fields hold [`WireValue::Absent`].
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    /// Namespace of the struct type.
    pub namespace: Namespace,
    /// Struct type name.
    pub name: TypeName,
    /// Field values keyed by wire name.
    pub fields: BTreeMap<String, WireValue>,
}

impl StructValue {
    /// Creates an empty struct value.
    #[must_use]
    pub fn new(namespace: impl Into<Namespace>, name: impl Into<TypeName>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Sets a field and returns the struct.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<WireValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&WireValue> {
        self.fields.get(field)
    }

    /// Returns true when the struct is an instance of `namespace.name`.
    #[must_use]
    pub fn is_type(&self, namespace: &str, name: &str) -> bool {
        self.namespace.as_str() == namespace && self.name.as_str() == name
    }
}
