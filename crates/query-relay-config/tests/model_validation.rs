//! Config model validation tests for query-relay-config.
// crates/query-relay-config/tests/model_validation.rs
// =============================================================================
// Module: Config Model Validation Tests
// Description: Validate section rules for server, approval, databases, and
//              sanitization.
// Purpose: Ensure invalid configuration never reaches the gateway.
// =============================================================================

use query_relay_config::ApprovalMode;
use query_relay_config::ConfigError;
use query_relay_config::MaskRule;
use query_relay_config::QueryRelayConfig;
use query_relay_config::SanitizationConfig;
use query_relay_config::SanitizationKind;
use query_relay_core::DatabaseId;

type TestResult = Result<(), String>;

const DATABASE: &str = "[[databases]]\nid = \"main\"\npath = \"relay.db\"\n";

fn assert_invalid(result: Result<QueryRelayConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}

fn with_database(extra: &str) -> String {
    format!("{extra}\n{DATABASE}")
}

#[test]
fn full_config_parses() -> TestResult {
    let text = r#"
[server]
bind = "127.0.0.1:9000"
max_body_bytes = 65536

[approval]
mode = "deny_all"
timeout_ms = 2000

[audit]
enabled = true
path = "audit.jsonl"

[[databases]]
id = "main"
path = "relay.db"
read_only = false

[[sanitization]]
entity_type = "Acceptance"
policy = "column_mask"
columns = { signer_name = "preserve_format", signer_email = "null" }

[[sanitization]]
entity_type = "Agreement"
policy = "pass_through"
"#;
    let config = QueryRelayConfig::from_toml(text).map_err(|err| err.to_string())?;
    if config.approval.mode != ApprovalMode::DenyAll || config.approval.timeout_ms != 2000 {
        return Err("approval section not parsed".to_string());
    }
    let acceptance = &config.sanitization[0];
    if acceptance.policy != SanitizationKind::ColumnMask
        || acceptance.columns.get("signer_name") != Some(&MaskRule::PreserveFormat)
        || acceptance.columns.get("signer_email") != Some(&MaskRule::Null)
    {
        return Err("sanitization section not parsed".to_string());
    }
    if config.database(&DatabaseId::new("main")).is_none() {
        return Err("database lookup failed".to_string());
    }
    Ok(())
}

#[test]
fn rejects_missing_databases() -> TestResult {
    assert_invalid(QueryRelayConfig::from_toml(""), "at least one [[databases]] entry required")
}

#[test]
fn rejects_duplicate_database_ids() -> TestResult {
    let text = format!("{DATABASE}{DATABASE}");
    assert_invalid(QueryRelayConfig::from_toml(&text), "duplicate database id: main")
}

#[test]
fn rejects_empty_database_path() -> TestResult {
    let text = "[[databases]]\nid = \"main\"\npath = \"  \"\n";
    assert_invalid(QueryRelayConfig::from_toml(text), "databases.path must be non-empty")
}

#[test]
fn rejects_unknown_fields() -> TestResult {
    let text = with_database("[server]\nport = 80\n");
    assert_invalid(QueryRelayConfig::from_toml(&text), "config parse error")
}

#[test]
fn rejects_invalid_bind_address() -> TestResult {
    let text = with_database("[server]\nbind = \"localhost\"\n");
    assert_invalid(QueryRelayConfig::from_toml(&text), "invalid bind address")
}

#[test]
fn rejects_non_loopback_without_opt_in() -> TestResult {
    let text = with_database("[server]\nbind = \"0.0.0.0:8710\"\n");
    assert_invalid(QueryRelayConfig::from_toml(&text), "non-loopback bind")?;
    let allowed = with_database("[server]\nbind = \"0.0.0.0:8710\"\nallow_non_loopback = true\n");
    QueryRelayConfig::from_toml(&allowed).map_err(|err| err.to_string())?;
    Ok(())
}

#[test]
fn rejects_zero_body_limit() -> TestResult {
    let text = with_database("[server]\nmax_body_bytes = 0\n");
    assert_invalid(QueryRelayConfig::from_toml(&text), "max_body_bytes must be greater than zero")
}

#[test]
fn rejects_out_of_range_approval_timeout() -> TestResult {
    let text = with_database("[approval]\ntimeout_ms = 5\n");
    assert_invalid(QueryRelayConfig::from_toml(&text), "approval.timeout_ms must be between")
}

#[test]
fn rejects_column_mask_without_columns() -> TestResult {
    let text = with_database(
        "[[sanitization]]\nentity_type = \"Acceptance\"\npolicy = \"column_mask\"\n",
    );
    assert_invalid(QueryRelayConfig::from_toml(&text), "column_mask but lists no columns")
}

#[test]
fn rejects_pass_through_with_columns() -> TestResult {
    let text = with_database(
        "[[sanitization]]\nentity_type = \"Agreement\"\npolicy = \"pass_through\"\ncolumns = { \
         title = \"fixed\" }\n",
    );
    assert_invalid(QueryRelayConfig::from_toml(&text), "pass_through but lists columns")
}

#[test]
fn rejects_duplicate_sanitization_entries() -> TestResult {
    let entry = "[[sanitization]]\nentity_type = \"Agreement\"\npolicy = \"pass_through\"\n";
    let text = with_database(&format!("{entry}{entry}"));
    assert_invalid(QueryRelayConfig::from_toml(&text), "duplicate sanitization entity_type")
}

#[test]
fn sanitization_table_defaults_to_snake_case_entity() -> TestResult {
    let text = with_database(
        "[[sanitization]]\nentity_type = \"LedgerKey\"\npolicy = \"pass_through\"\n\n\
         [[sanitization]]\nentity_type = \"Acceptance\"\ntable = \"signed_acceptance\"\n\
         policy = \"pass_through\"\n",
    );
    let config = QueryRelayConfig::from_toml(&text).map_err(|err| err.to_string())?;
    let tables: Vec<String> =
        config.sanitization.iter().map(SanitizationConfig::table_name).collect();
    if tables != ["ledger_key", "signed_acceptance"] {
        return Err(format!("unexpected tables: {}", tables.join(", ")));
    }
    Ok(())
}

#[test]
fn rejects_two_policies_for_one_table() -> TestResult {
    let text = with_database(
        "[[sanitization]]\nentity_type = \"Agreement\"\npolicy = \"pass_through\"\n\n\
         [[sanitization]]\nentity_type = \"AgreementSummary\"\ntable = \"Agreement\"\n\
         policy = \"pass_through\"\n",
    );
    assert_invalid(QueryRelayConfig::from_toml(&text), "duplicate sanitization table: Agreement")
}
