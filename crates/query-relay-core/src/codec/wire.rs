// crates/query-relay-core/src/codec/wire.rs
// ============================================================================
// Module: Wire Codec
// Description: WireValue <-> JSON conversion driven by type descriptors.
// Purpose: Carry typed rows across the gateway boundary without precision loss.
// Dependencies: bigdecimal, serde_json, time, crate::codec::{descriptor, registry, value}
// ============================================================================

//! ## Overview
//! [`encode`] needs only the value; [`decode`] needs the value plus a
//! [`TypeDescriptor`] and the [`TypeRegistry`] that resolves named types.
//!
//! Invariants:
//! - Decimals travel as strings, never floats.
//! - Struct fields holding [`WireValue::Absent`] are omitted on encode and
//!   reintroduced as absent on decode. Inside lists the sentinel string is
//!   written instead because omission is not expressible there.
//! - The sentinel string decodes to [`WireValue::Absent`] wherever it appears.
//! - Decode is all-or-nothing: any failure discards the partial value.
//! - Unions select the first alternative that decodes in full.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use thiserror::Error;
use time::Date;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::codec::descriptor::DescriptorError;
use crate::codec::descriptor::ScalarKind;
use crate::codec::descriptor::TypeDescriptor;
use crate::codec::registry::TypeRegistry;
use crate::codec::value::ABSENT_SENTINEL;
use crate::codec::value::Row;
use crate::codec::value::StructValue;
use crate::codec::value::WireValue;
use crate::identifiers::Namespace;
use crate::identifiers::TypeName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Calendar date wire format.
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
/// Path label for the decode root.
const ROOT_PATH: &str = "$";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Codec failures.
///
/// # Invariants
/// - `Parse` and `Resolution` are caller or configuration bugs; `Validation`
///   means the JSON did not match the requested shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Type descriptor failed to parse.
    #[error("type descriptor parse error: {0}")]
    Parse(#[from] DescriptorError),
    /// Named type missing from the registry.
    #[error("type {namespace}.{name} is not registered")]
    Resolution {
        /// Namespace searched.
        namespace: Namespace,
        /// Type name searched.
        name: TypeName,
    },
    /// Value did not match the requested descriptor.
    #[error("validation error at {path}: {message}")]
    Validation {
        /// JSON path of the failing value.
        path: String,
        /// Failure description.
        message: String,
    },
}

impl CodecError {
    /// Builds a validation error.
    pub(crate) fn validation(path: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Encode
// ============================================================================

/// Encodes a value into its JSON wire form.
///
/// # Errors
///
/// Returns [`CodecError::Validation`] for non-finite floats or date-times
/// outside the RFC 3339 range.
pub fn encode(value: &WireValue) -> Result<Value, CodecError> {
    encode_at(value, ROOT_PATH)
}

/// Encodes an untyped row with struct-field omission rules.
///
/// # Errors
///
/// Returns [`CodecError::Validation`] when a column value cannot be encoded.
pub fn encode_row(row: &Row) -> Result<Value, CodecError> {
    let mut object = Map::new();
    for (column, value) in row {
        if value.is_absent() {
            continue;
        }
        object.insert(column.clone(), encode_at(value, &child_path(ROOT_PATH, column))?);
    }
    Ok(Value::Object(object))
}

/// Encodes a value at a JSON path.
fn encode_at(value: &WireValue, path: &str) -> Result<Value, CodecError> {
    match value {
        WireValue::Null => Ok(Value::Null),
        WireValue::Absent => Ok(Value::String(ABSENT_SENTINEL.to_string())),
        WireValue::Bool(flag) => Ok(Value::Bool(*flag)),
        WireValue::Integer(number) => Ok(Value::Number((*number).into())),
        WireValue::Float(number) => Number::from_f64(*number)
            .map(Value::Number)
            .ok_or_else(|| CodecError::validation(path, "float is not finite")),
        WireValue::String(text) => Ok(Value::String(text.clone())),
        WireValue::Decimal(decimal) => Ok(Value::String(decimal.to_string())),
        WireValue::DateTime(moment) => moment
            .format(&Rfc3339)
            .map(Value::String)
            .map_err(|err| CodecError::validation(path, format!("datetime: {err}"))),
        WireValue::Date(date) => date
            .format(DATE_FORMAT)
            .map(Value::String)
            .map_err(|err| CodecError::validation(path, format!("date: {err}"))),
        WireValue::List(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| encode_at(item, &index_path(path, index)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        WireValue::Struct(value) => {
            let mut object = Map::new();
            for (field, item) in &value.fields {
                if item.is_absent() {
                    continue;
                }
                object.insert(field.clone(), encode_at(item, &child_path(path, field))?);
            }
            Ok(Value::Object(object))
        }
    }
}

// ============================================================================
// SECTION: Decode
// ============================================================================

/// Decodes JSON against a descriptor.
///
/// # Errors
///
/// Returns [`CodecError`] when a named type cannot be resolved or the JSON
/// does not match the descriptor.
pub fn decode(
    json: &Value,
    descriptor: &TypeDescriptor,
    registry: &TypeRegistry,
) -> Result<WireValue, CodecError> {
    Decoder {
        registry,
    }
    .decode_at(json, descriptor, ROOT_PATH)
}

/// Parses a descriptor string captured from `namespace` and decodes against it.
///
/// # Errors
///
/// Returns [`CodecError::Parse`] for malformed descriptors, otherwise as [`decode`].
pub fn decode_with_descriptor(
    json: &Value,
    descriptor: &str,
    namespace: &Namespace,
    registry: &TypeRegistry,
) -> Result<WireValue, CodecError> {
    let descriptor = TypeDescriptor::parse(descriptor, namespace)?;
    decode(json, &descriptor, registry)
}

/// Produces the value for a descriptor when no JSON value exists at all.
///
/// # Errors
///
/// Returns [`CodecError::Validation`] unless the descriptor accepts null or absence.
pub fn decode_missing(descriptor: &TypeDescriptor) -> Result<WireValue, CodecError> {
    match descriptor {
        TypeDescriptor::Scalar(ScalarKind::Absent) => Ok(WireValue::Absent),
        TypeDescriptor::UnionOf(alternatives)
            if alternatives.contains(&TypeDescriptor::Scalar(ScalarKind::Absent)) =>
        {
            Ok(WireValue::Absent)
        }
        descriptor if descriptor.accepts_null() => Ok(WireValue::Null),
        other => Err(CodecError::validation(ROOT_PATH, format!("expected {other}, found nothing"))),
    }
}

/// Descriptor-driven decoder bound to a registry.
struct Decoder<'a> {
    /// Registry resolving named types.
    registry: &'a TypeRegistry,
}

impl Decoder<'_> {
    /// Decodes one JSON value at `path`.
    fn decode_at(
        &self,
        json: &Value,
        descriptor: &TypeDescriptor,
        path: &str,
    ) -> Result<WireValue, CodecError> {
        if matches!(json, Value::String(text) if text == ABSENT_SENTINEL) {
            return Ok(WireValue::Absent);
        }
        match descriptor {
            TypeDescriptor::Scalar(kind) => decode_scalar(json, *kind, path),
            TypeDescriptor::Optional(inner) => {
                if json.is_null() {
                    Ok(WireValue::Null)
                } else {
                    self.decode_at(json, inner, path)
                }
            }
            TypeDescriptor::ListOf(inner) => {
                let Value::Array(items) = json else {
                    return Err(mismatch(path, descriptor, json));
                };
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.decode_at(item, inner, &index_path(path, index)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(WireValue::List)
            }
            TypeDescriptor::UnionOf(alternatives) => {
                self.decode_union(json, descriptor, alternatives, path)
            }
            TypeDescriptor::Named {
                namespace,
                name,
            } => self.decode_struct(json, namespace, name, path),
        }
    }

    /// Selects the first alternative that decodes in full.
    fn decode_union(
        &self,
        json: &Value,
        descriptor: &TypeDescriptor,
        alternatives: &[TypeDescriptor],
        path: &str,
    ) -> Result<WireValue, CodecError> {
        let mut reasons = Vec::with_capacity(alternatives.len());
        for alternative in alternatives {
            match self.decode_at(json, alternative, path) {
                Ok(value) => return Ok(value),
                Err(err @ (CodecError::Parse(_) | CodecError::Resolution { .. })) => {
                    return Err(err);
                }
                Err(CodecError::Validation {
                    message, ..
                }) => reasons.push(format!("{alternative}: {message}")),
            }
        }
        Err(CodecError::validation(
            path,
            format!("no alternative of {descriptor} matched ({})", reasons.join("; ")),
        ))
    }

    /// Decodes a JSON object into a registered struct.
    fn decode_struct(
        &self,
        json: &Value,
        namespace: &Namespace,
        name: &TypeName,
        path: &str,
    ) -> Result<WireValue, CodecError> {
        let schema = self.registry.lookup(namespace, name).ok_or_else(|| {
            CodecError::Resolution {
                namespace: namespace.clone(),
                name: name.clone(),
            }
        })?;
        let Value::Object(object) = json else {
            return Err(CodecError::validation(
                path,
                format!("expected object for {name}, found {}", json_kind(json)),
            ));
        };
        let mut value = StructValue::new(namespace.clone(), name.clone());
        for field in &schema.fields {
            let field_path = child_path(path, &field.name);
            let decoded = match object.get(&field.name) {
                Some(item) => self.decode_at(item, &field.descriptor, &field_path)?,
                None if field.required => {
                    return Err(CodecError::validation(&field_path, "required field missing"));
                }
                None => WireValue::Absent,
            };
            value.fields.insert(field.name.clone(), decoded);
        }
        if let Some(construct) = schema.construct {
            construct(&value).map_err(|message| CodecError::validation(path, message))?;
        }
        Ok(WireValue::Struct(value))
    }
}

/// Decodes a scalar JSON value.
fn decode_scalar(json: &Value, kind: ScalarKind, path: &str) -> Result<WireValue, CodecError> {
    let descriptor = TypeDescriptor::Scalar(kind);
    match (kind, json) {
        (ScalarKind::Null, Value::Null) => Ok(WireValue::Null),
        (ScalarKind::String, Value::String(text)) => Ok(WireValue::String(text.clone())),
        (ScalarKind::Boolean, Value::Bool(flag)) => Ok(WireValue::Bool(*flag)),
        (ScalarKind::Integer, Value::Number(number)) => number
            .as_i64()
            .map(WireValue::Integer)
            .ok_or_else(|| CodecError::validation(path, format!("{number} is not an int"))),
        (ScalarKind::Float, Value::Number(number)) => number
            .as_f64()
            .map(WireValue::Float)
            .ok_or_else(|| CodecError::validation(path, format!("{number} is not a float"))),
        (ScalarKind::Decimal, Value::String(text)) => parse_decimal(text, path),
        (ScalarKind::Decimal, Value::Number(number)) => parse_decimal(&number.to_string(), path),
        (ScalarKind::DateTime, Value::String(text)) => OffsetDateTime::parse(text, &Rfc3339)
            .map(WireValue::DateTime)
            .map_err(|err| CodecError::validation(path, format!("invalid datetime: {err}"))),
        (ScalarKind::Date, Value::String(text)) => Date::parse(text, DATE_FORMAT)
            .map(WireValue::Date)
            .map_err(|err| CodecError::validation(path, format!("invalid date: {err}"))),
        _ => Err(mismatch(path, &descriptor, json)),
    }
}

/// Parses a decimal from its string form.
fn parse_decimal(text: &str, path: &str) -> Result<WireValue, CodecError> {
    BigDecimal::from_str(text)
        .map(WireValue::Decimal)
        .map_err(|err| CodecError::validation(path, format!("invalid decimal: {err}")))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a kind-mismatch validation error.
fn mismatch(path: &str, descriptor: &TypeDescriptor, json: &Value) -> CodecError {
    CodecError::validation(path, format!("expected {descriptor}, found {}", json_kind(json)))
}

/// Returns a JSON kind label.
const fn json_kind(json: &Value) -> &'static str {
    match json {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Appends an object key to a path.
fn child_path(path: &str, key: &str) -> String {
    format!("{path}.{key}")
}

/// Appends a list index to a path.
fn index_path(path: &str, index: usize) -> String {
    format!("{path}[{index}]")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use std::str::FromStr;

    use bigdecimal::BigDecimal;
    use serde_json::json;
    use time::macros::date;
    use time::macros::datetime;

    use super::CodecError;
    use super::decode;
    use super::decode_missing;
    use super::decode_with_descriptor;
    use super::encode;
    use crate::codec::descriptor::ScalarKind;
    use crate::codec::descriptor::TypeDescriptor;
    use crate::codec::registry::TypeRegistry;
    use crate::codec::value::ABSENT_SENTINEL;
    use crate::codec::value::StructValue;
    use crate::codec::value::WireValue;
    use crate::identifiers::Namespace;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .define("ledger", "LedgerKey")
            .required("ledger_id", "str")
            .optional("code", "str")
            .finish()
            .unwrap();
        registry
            .define("ledger", "ResponseError")
            .required("code", "str")
            .optional("detail", "Union[Unset, None, str]")
            .finish()
            .unwrap();
        registry
    }

    #[test]
    fn decimals_encode_as_strings() {
        let value = WireValue::Decimal(BigDecimal::from_str("12345678901234567890.000001").unwrap());
        assert_eq!(encode(&value).unwrap(), json!("12345678901234567890.000001"));
    }

    #[test]
    fn temporal_values_use_fixed_profile() {
        let moment = WireValue::DateTime(datetime!(2024-03-01 12:30:00 UTC));
        assert_eq!(encode(&moment).unwrap(), json!("2024-03-01T12:30:00Z"));
        let day = WireValue::Date(date!(2024 - 03 - 01));
        assert_eq!(encode(&day).unwrap(), json!("2024-03-01"));
    }

    #[test]
    fn non_finite_float_is_rejected() {
        assert!(matches!(
            encode(&WireValue::Float(f64::NAN)),
            Err(CodecError::Validation { .. })
        ));
    }

    #[test]
    fn absent_struct_fields_are_omitted_but_list_elements_keep_sentinel() {
        let value = StructValue::new("ledger", "ResponseError")
            .with("code", "ABC")
            .with("detail", WireValue::Absent);
        assert_eq!(encode(&WireValue::Struct(value)).unwrap(), json!({"code": "ABC"}));
        let list = WireValue::List(vec![WireValue::Absent, WireValue::Integer(1)]);
        assert_eq!(encode(&list).unwrap(), json!([ABSENT_SENTINEL, 1]));
    }

    #[test]
    fn union_selects_first_structurally_compatible_alternative() {
        let descriptor =
            TypeDescriptor::parse("Union[LedgerKey, ResponseError]", &Namespace::new("ledger"))
                .unwrap();
        let decoded = decode(&json!({"code": "ABC"}), &descriptor, &registry()).unwrap();
        let WireValue::Struct(value) = decoded else {
            panic!("expected struct");
        };
        assert!(value.is_type("ledger", "ResponseError"));
        assert_eq!(value.get("detail"), Some(&WireValue::Absent));
    }

    #[test]
    fn missing_required_field_is_validation_error() {
        let err = decode_with_descriptor(
            &json!({"detail": "x"}),
            "ResponseError",
            &Namespace::new("ledger"),
            &registry(),
        );
        assert_eq!(
            err,
            Err(CodecError::Validation {
                path: "$.code".to_string(),
                message: "required field missing".to_string(),
            })
        );
    }

    #[test]
    fn unknown_named_type_is_resolution_error() {
        let err = decode_with_descriptor(
            &json!({}),
            "Account",
            &Namespace::new("ledger"),
            &registry(),
        );
        assert!(matches!(err, Err(CodecError::Resolution { .. })));
    }

    #[test]
    fn sentinel_decodes_to_absent_even_inside_scalars() {
        let decoded = decode(
            &json!(ABSENT_SENTINEL),
            &TypeDescriptor::Scalar(ScalarKind::String),
            &registry(),
        );
        assert_eq!(decoded, Ok(WireValue::Absent));
    }

    #[test]
    fn null_requires_nullable_descriptor() {
        let scalar = TypeDescriptor::Scalar(ScalarKind::Integer);
        assert!(decode(&json!(null), &scalar, &registry()).is_err());
        let optional = TypeDescriptor::Optional(Box::new(scalar));
        assert_eq!(decode(&json!(null), &optional, &registry()), Ok(WireValue::Null));
    }

    #[test]
    fn missing_value_resolves_only_for_nullable_descriptors() {
        let optional = TypeDescriptor::parse("Optional[int]", &Namespace::new("ledger")).unwrap();
        assert_eq!(decode_missing(&optional), Ok(WireValue::Null));
        let plain = TypeDescriptor::Scalar(ScalarKind::Integer);
        assert!(decode_missing(&plain).is_err());
    }

    #[test]
    fn integer_rejects_fractional_numbers() {
        let scalar = TypeDescriptor::Scalar(ScalarKind::Integer);
        assert!(decode(&json!(1.5), &scalar, &registry()).is_err());
    }
}
