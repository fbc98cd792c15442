// crates/query-relay-core/tests/query_properties.rs
// ============================================================================
// Module: Query Serializer Property Tests
// Description: Parameter uniqueness, determinism, and no-inlining properties.
// Purpose: Guard the SerializedQuery invariants across generated inputs.
// ============================================================================

//! Property-based tests for query serialization invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;

use proptest::prelude::*;
use query_relay_core::ApprovalContext;
use query_relay_core::DatabaseId;
use query_relay_core::Entity;
use query_relay_core::ExecuteRequest;
use query_relay_core::ScalarValue;
use query_relay_core::SerializedQuery;
use query_relay_core::query::Delete;
use query_relay_core::query::Direction;
use query_relay_core::query::Select;
use query_relay_core::query::col;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

struct Acceptance;

impl Entity for Acceptance {
    const ENTITY_TYPE: &'static str = "Acceptance";
    const TABLE: &'static str = "acceptance";
    const COLUMNS: &'static [&'static str] = &["id", "agreement_id", "signer_name"];
}

/// Extracts placeholder names (without the colon) from SQL text.
fn placeholders(sql: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut rest = sql;
    while let Some(start) = rest.find(':') {
        let tail = &rest[start + 1..];
        let end = tail.find(|ch: char| !ch.is_ascii_alphanumeric()).unwrap_or(tail.len());
        names.insert(tail[..end].to_string());
        rest = &tail[end..];
    }
    names
}

fn assert_placeholders_match(query: &SerializedQuery) {
    let keys = query.parameters.keys().cloned().collect::<BTreeSet<_>>();
    assert_eq!(placeholders(&query.sql_text), keys);
}

fn filtered(ids: &[i64], name: &str, limit: u64) -> SerializedQuery {
    Select::<Acceptance>::new()
        .filter(col("id").is_in(ids.iter().copied()))
        .filter(col("signer_name").eq(name).or(col("signer_name").is_null()))
        .order_by("id", Direction::Asc)
        .limit(limit)
        .serialize()
        .unwrap()
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #[test]
    fn equal_literals_bind_distinct_parameters(value in "lit_[a-z]{6}") {
        let query = Select::<Acceptance>::new()
            .filter(col("agreement_id").eq(value.as_str()))
            .filter(col("signer_name").eq(value.as_str()))
            .serialize()
            .unwrap();
        prop_assert_eq!(query.parameters.len(), 2);
        for bound in query.parameters.values() {
            prop_assert_eq!(bound, &ScalarValue::Text(value.clone()));
        }
        prop_assert!(!query.sql_text.contains(&value));
        assert_placeholders_match(&query);
    }

    #[test]
    fn serialization_is_deterministic(
        ids in proptest::collection::vec(any::<i64>(), 0..6),
        name in "[a-z]{0,8}",
        limit in 0_u64..10_000,
    ) {
        let first = filtered(&ids, &name, limit);
        let second = filtered(&ids, &name, limit);
        prop_assert_eq!(&first.sql_text, &second.sql_text);
        prop_assert_eq!(&first.parameters, &second.parameters);
        assert_placeholders_match(&first);
    }

    #[test]
    fn in_list_binds_every_element(ids in proptest::collection::vec(any::<i64>(), 1..8)) {
        let query = Select::<Acceptance>::new()
            .filter(col("id").is_in(ids.iter().copied()))
            .serialize()
            .unwrap();
        prop_assert_eq!(query.parameters.len(), ids.len());
        for (index, id) in ids.iter().enumerate() {
            prop_assert_eq!(query.parameters.get(&format!("p{index}")), Some(&ScalarValue::Integer(*id)));
        }
    }
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

#[test]
fn acceptance_lookup_matches_expected_shape() {
    let query = Select::<Acceptance>::new().filter(col("agreement_id").eq("X")).serialize().unwrap();
    assert!(query.sql_text.starts_with("SELECT "));
    assert!(query.sql_text.ends_with(" WHERE agreement_id = :p0"));
    assert_eq!(query.parameters.len(), 1);
    assert_eq!(query.parameters["p0"], ScalarValue::Text("X".to_string()));
    assert_eq!(query.entity.as_str(), "Acceptance");
}

#[test]
fn request_envelope_carries_write_intent() {
    let query = Delete::<Acceptance>::new().filter(col("id").eq(4_i64)).serialize().unwrap();
    let request = ExecuteRequest::from_query(
        &query,
        DatabaseId::new("main"),
        Some(ApprovalContext::new("remove duplicate")),
    );
    assert!(request.write_intent);
    assert_eq!(request.sql_text, "DELETE FROM acceptance WHERE id = :p0");
    let wire = serde_json::to_value(&request).unwrap();
    assert_eq!(wire["parameters"]["p0"], serde_json::json!(4));
}
