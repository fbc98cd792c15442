// crates/query-relay-core/src/scalar.rs
// ============================================================================
// Module: Scalar Parameters
// Description: Bound parameter values carried in serialized queries.
// Purpose: Give every literal a single, JSON-primitive wire form.
// Dependencies: bigdecimal, serde, time
// ============================================================================

//! ## Overview
//! A [`ScalarValue`] is what a literal in a query expression becomes once it
//! is bound to a placeholder. On the wire every variant is a JSON primitive.
//! Decimals and temporal values travel as strings, so after a round trip
//! through JSON they arrive as [`ScalarValue::Text`]; the database binds the
//! text form, which is what the caller produced anyway.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::Visitor;
use time::Date;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

// ============================================================================
// SECTION: Scalar Value
// ============================================================================

/// Literal bound to a named placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// SQL null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Float.
    Float(f64),
    /// Text.
    Text(String),
    /// Decimal; serialized as its exact string form.
    Decimal(BigDecimal),
    /// Date-time; serialized as RFC 3339.
    Timestamp(OffsetDateTime),
    /// Calendar date; serialized as `YYYY-MM-DD`.
    Date(Date),
}

impl ScalarValue {
    /// Returns true for [`ScalarValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns a short kind label for diagnostics.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Decimal(_) => "decimal",
            Self::Timestamp(_) => "timestamp",
            Self::Date(_) => "date",
        }
    }

    /// Renders decimals and temporal values in their string wire form.
    ///
    /// Returns `None` for variants that serialize as native JSON.
    #[must_use]
    pub fn text_form(&self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text.clone()),
            Self::Decimal(decimal) => Some(decimal.to_string()),
            Self::Timestamp(moment) => moment.format(&Rfc3339).ok(),
            Self::Date(date) => date.format(format_description!("[year]-[month]-[day]")).ok(),
            Self::Null | Self::Bool(_) | Self::Integer(_) | Self::Float(_) => None,
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<BigDecimal> for ScalarValue {
    fn from(value: BigDecimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<OffsetDateTime> for ScalarValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Date> for ScalarValue {
    fn from(value: Date) -> Self {
        Self::Date(value)
    }
}

// ============================================================================
// SECTION: Serde
// ============================================================================

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(flag) => serializer.serialize_bool(*flag),
            Self::Integer(number) => serializer.serialize_i64(*number),
            Self::Float(number) => {
                if number.is_finite() {
                    serializer.serialize_f64(*number)
                } else {
                    Err(serde::ser::Error::custom("non-finite float parameter"))
                }
            }
            other => match other.text_form() {
                Some(text) => serializer.serialize_str(&text),
                None => Err(serde::ser::Error::custom("temporal value out of range")),
            },
        }
    }
}

impl<'de> Deserialize<'de> for ScalarValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

/// Visitor accepting JSON primitives only.
struct ScalarVisitor;

impl Visitor<'_> for ScalarVisitor {
    type Value = ScalarValue;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a JSON null, boolean, number, or string")
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(ScalarValue::Null)
    }

    fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(ScalarValue::Null)
    }

    fn visit_bool<E: serde::de::Error>(self, value: bool) -> Result<Self::Value, E> {
        Ok(ScalarValue::Bool(value))
    }

    fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(ScalarValue::Integer(value))
    }

    fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<Self::Value, E> {
        i64::try_from(value)
            .map(ScalarValue::Integer)
            .map_err(|_| E::custom("integer parameter exceeds i64 range"))
    }

    fn visit_f64<E: serde::de::Error>(self, value: f64) -> Result<Self::Value, E> {
        Ok(ScalarValue::Float(value))
    }

    fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(ScalarValue::Text(value.to_string()))
    }

    fn visit_string<E: serde::de::Error>(self, value: String) -> Result<Self::Value, E> {
        Ok(ScalarValue::Text(value))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
