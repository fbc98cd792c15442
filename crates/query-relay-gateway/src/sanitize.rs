// crates/query-relay-gateway/src/sanitize.rs
// ============================================================================
// Module: Row Sanitization
// Description: Per-table, format-preserving row masking.
// Purpose: Ensure no row leaves the gateway without an explicit policy.
// Dependencies: query-relay-core, query-relay-config
// ============================================================================

//! ## Overview
//! A [`SanitizerRegistry`] maps source tables to a [`SanitizationPolicy`].
//! The policy for each result column is chosen from the table the backend
//! says the value came from, and masks apply by source column, so aliases,
//! joins, and the caller's declared entity type cannot route around them.
//! Lookups are fail-closed: a column from a table without a policy, or a
//! column whose source cannot be determined, withholds every row.
//!
//! Invariants:
//! - Masked strings keep their character count.
//! - Masking a value that cannot be masked in place fails the row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use query_relay_config::MaskRule;
use query_relay_config::SanitizationConfig;
use query_relay_config::SanitizationKind;
use query_relay_core::Row;
use query_relay_core::WireValue;
use thiserror::Error;

use crate::database::QueryOutput;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Sanitization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    /// Result column is computed rather than read from a table.
    #[error("sanitization gap: result column {0} has no source table")]
    UnknownOrigin(String),
    /// No policy is registered for the source table.
    #[error("sanitization gap: no policy for table {0}")]
    Gap(String),
    /// A mask changed the value's character count.
    #[error("mask for column {column} is not format-preserving")]
    NotFormatPreserving {
        /// Column name.
        column: String,
    },
    /// The value kind has no in-place mask.
    #[error("column {column} holds {kind}, which cannot be masked in place")]
    Unmaskable {
        /// Column name.
        column: String,
        /// Value kind label.
        kind: &'static str,
    },
}

// ============================================================================
// SECTION: Policies
// ============================================================================

/// Sanitization policy for one source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizationPolicy {
    /// Table carries no sensitive data.
    PassThrough,
    /// Listed columns are masked; the rest pass unchanged.
    ColumnMask(BTreeMap<String, MaskRule>),
}

impl SanitizationPolicy {
    /// Returns the mask for a source column, if any.
    #[must_use]
    pub fn rule(&self, column: &str) -> Option<MaskRule> {
        let Self::ColumnMask(columns) = self else {
            return None;
        };
        columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, rule)| *rule)
    }
}

impl From<&SanitizationConfig> for SanitizationPolicy {
    fn from(config: &SanitizationConfig) -> Self {
        match config.policy {
            SanitizationKind::PassThrough => Self::PassThrough,
            SanitizationKind::ColumnMask => Self::ColumnMask(config.columns.clone()),
        }
    }
}

/// Masks a single column value.
fn mask_value(column: &str, rule: MaskRule, value: &WireValue) -> Result<WireValue, SanitizeError> {
    match (rule, value) {
        (MaskRule::Null, _) | (_, WireValue::Null) => Ok(WireValue::Null),
        (MaskRule::PreserveFormat | MaskRule::Fixed, WireValue::String(text)) => {
            let masked = mask_text(rule, text);
            if masked.chars().count() == text.chars().count() {
                Ok(WireValue::String(masked))
            } else {
                Err(SanitizeError::NotFormatPreserving {
                    column: column.to_string(),
                })
            }
        }
        (_, other) => Err(SanitizeError::Unmaskable {
            column: column.to_string(),
            kind: other.kind_label(),
        }),
    }
}

/// Masks text character by character.
fn mask_text(rule: MaskRule, text: &str) -> String {
    text.chars()
        .map(|ch| match rule {
            MaskRule::Fixed => '*',
            _ if ch.is_alphabetic() => 'X',
            _ if ch.is_numeric() => '0',
            _ => ch,
        })
        .collect()
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Table-keyed sanitization policies.
#[derive(Debug, Clone, Default)]
pub struct SanitizerRegistry {
    /// Registered policies keyed by lowercase table name.
    policies: BTreeMap<String, SanitizationPolicy>,
}

impl SanitizerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from configuration entries.
    #[must_use]
    pub fn from_config(entries: &[SanitizationConfig]) -> Self {
        let mut registry = Self::new();
        for entry in entries {
            registry.register(&entry.table_name(), SanitizationPolicy::from(entry));
        }
        registry
    }

    /// Registers a policy for a table, replacing any previous one.
    pub fn register(&mut self, table: &str, policy: SanitizationPolicy) {
        self.policies.insert(table.to_ascii_lowercase(), policy);
    }

    /// Returns the policy for a table; names compare case-insensitively.
    #[must_use]
    pub fn policy(&self, table: &str) -> Option<&SanitizationPolicy> {
        self.policies.get(&table.to_ascii_lowercase())
    }

    /// Sanitizes every row, failing the whole batch on the first error.
    ///
    /// An empty batch needs no policy.
    ///
    /// # Errors
    ///
    /// Returns [`SanitizeError`] on a policy gap, a computed column, or a
    /// masking failure.
    pub fn sanitize(&self, output: QueryOutput) -> Result<Vec<Row>, SanitizeError> {
        let QueryOutput {
            columns,
            rows,
        } = output;
        if rows.is_empty() {
            return Ok(rows);
        }
        let mut masks = Vec::new();
        for origin in &columns {
            let (Some(table), Some(column)) = (origin.table.as_deref(), origin.column.as_deref())
            else {
                return Err(SanitizeError::UnknownOrigin(origin.name.clone()));
            };
            let policy = self.policy(table).ok_or_else(|| SanitizeError::Gap(table.to_string()))?;
            if let Some(rule) = policy.rule(column) {
                masks.push((origin.name.as_str(), rule));
            }
        }
        rows.into_iter()
            .map(|mut row| {
                for (name, rule) in &masks {
                    if let Some(value) = row.get_mut(*name) {
                        *value = mask_value(name, *rule, value)?;
                    }
                }
                Ok(row)
            })
            .collect()
    }
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

    use std::collections::BTreeMap;

    use query_relay_config::MaskRule;
    use query_relay_core::Row;
    use query_relay_core::WireValue;

    use super::SanitizationPolicy;
    use super::SanitizeError;
    use super::SanitizerRegistry;
    use crate::database::ColumnOrigin;
    use crate::database::QueryOutput;

    fn acceptance_columns() -> Vec<ColumnOrigin> {
        ["id", "signer_name", "signer_email", "nickname"]
            .iter()
            .map(|column| ColumnOrigin::table_column(column, "acceptance", column))
            .collect()
    }

    fn row() -> Row {
        Row::from([
            ("id".to_string(), WireValue::Integer(7)),
            ("signer_name".to_string(), WireValue::String("Ann O'Neil 2".to_string())),
            ("signer_email".to_string(), WireValue::String("ann@example.com".to_string())),
            ("nickname".to_string(), WireValue::Null),
        ])
    }

    fn output(columns: Vec<ColumnOrigin>, rows: Vec<Row>) -> QueryOutput {
        QueryOutput {
            columns,
            rows,
        }
    }

    fn registry() -> SanitizerRegistry {
        let mut registry = SanitizerRegistry::new();
        registry.register(
            "acceptance",
            SanitizationPolicy::ColumnMask(BTreeMap::from([
                ("signer_name".to_string(), MaskRule::PreserveFormat),
                ("signer_email".to_string(), MaskRule::Fixed),
                ("nickname".to_string(), MaskRule::Fixed),
            ])),
        );
        registry.register("Agreement", SanitizationPolicy::PassThrough);
        registry
    }

    #[test]
    fn column_mask_preserves_format() {
        let rows = registry().sanitize(output(acceptance_columns(), vec![row()])).unwrap();
        assert_eq!(rows[0]["id"], WireValue::Integer(7));
        assert_eq!(rows[0]["signer_name"], WireValue::String("XXX X'XXXX 0".to_string()));
        assert_eq!(rows[0]["signer_email"], WireValue::String("*".repeat(15)));
        assert_eq!(rows[0]["nickname"], WireValue::Null);
    }

    #[test]
    fn pass_through_returns_rows_unchanged() {
        let columns = vec![
            ColumnOrigin::table_column("id", "agreement", "id"),
            ColumnOrigin::table_column("title", "AGREEMENT", "title"),
        ];
        let agreement = Row::from([
            ("id".to_string(), WireValue::String("A-1".to_string())),
            ("title".to_string(), WireValue::String("MSA".to_string())),
        ]);
        let rows = registry().sanitize(output(columns, vec![agreement.clone()])).unwrap();
        assert_eq!(rows, vec![agreement]);
    }

    #[test]
    fn aliased_columns_are_masked_by_source_column() {
        let columns = vec![ColumnOrigin::table_column("n", "acceptance", "signer_name")];
        let aliased = Row::from([("n".to_string(), WireValue::String("Ann".to_string()))]);
        let rows = registry().sanitize(output(columns, vec![aliased])).unwrap();
        assert_eq!(rows[0]["n"], WireValue::String("XXX".to_string()));
    }

    #[test]
    fn joined_columns_follow_their_own_table_policy() {
        let columns = vec![
            ColumnOrigin::table_column("title", "agreement", "title"),
            ColumnOrigin::table_column("signer_name", "acceptance", "signer_name"),
        ];
        let joined = Row::from([
            ("title".to_string(), WireValue::String("MSA".to_string())),
            ("signer_name".to_string(), WireValue::String("Ann".to_string())),
        ]);
        let rows = registry().sanitize(output(columns, vec![joined])).unwrap();
        assert_eq!(rows[0]["title"], WireValue::String("MSA".to_string()));
        assert_eq!(rows[0]["signer_name"], WireValue::String("XXX".to_string()));
    }

    #[test]
    fn unregistered_tables_and_computed_columns_fail_closed() {
        let columns = vec![ColumnOrigin::table_column("id", "ledger", "id")];
        let err = registry().sanitize(output(columns, vec![row()])).unwrap_err();
        assert_eq!(err, SanitizeError::Gap("ledger".to_string()));

        let columns = vec![ColumnOrigin::computed("total")];
        let err = registry().sanitize(output(columns, vec![row()])).unwrap_err();
        assert_eq!(err, SanitizeError::UnknownOrigin("total".to_string()));

        let columns = vec![ColumnOrigin::computed("total")];
        assert!(registry().sanitize(output(columns, Vec::new())).unwrap().is_empty());
    }

    #[test]
    fn non_text_values_cannot_be_masked_in_place() {
        let mut registry = SanitizerRegistry::new();
        registry.register(
            "acceptance",
            SanitizationPolicy::ColumnMask(BTreeMap::from([(
                "id".to_string(),
                MaskRule::PreserveFormat,
            )])),
        );
        let err = registry.sanitize(output(acceptance_columns(), vec![row()])).unwrap_err();
        assert_eq!(
            err,
            SanitizeError::Unmaskable {
                column: "id".to_string(),
                kind: "int"
            }
        );
    }
}
