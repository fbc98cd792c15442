// crates/query-relay-config/src/config.rs
// ============================================================================
// Module: Query Relay Configuration
// Description: Configuration loading and validation for the gateway.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: query-relay-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed: rows read from a table
//! without a `[[sanitization]]` entry are never returned, and a gateway
//! without `[[databases]]` refuses to start.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use query_relay_core::DatabaseId;
use query_relay_core::EntityType;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "query-relay.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "QUERY_RELAY_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum request body size accepted by the HTTP server.
pub(crate) const MAX_BODY_BYTES_LIMIT: usize = 16 * 1024 * 1024;
/// Minimum approval wait window in milliseconds.
pub(crate) const MIN_APPROVAL_TIMEOUT_MS: u64 = 100;
/// Maximum approval wait window in milliseconds.
pub(crate) const MAX_APPROVAL_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;
/// Maximum number of configured databases.
pub(crate) const MAX_DATABASES: usize = 64;
/// Maximum number of sanitization entries.
pub(crate) const MAX_SANITIZATION_ENTRIES: usize = 1024;
/// Maximum length of an identifier such as a database id or entity type.
pub(crate) const MAX_IDENTIFIER_LENGTH: usize = 128;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Query Relay gateway configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRelayConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Approval gate configuration.
    #[serde(default)]
    pub approval: ApprovalConfig,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Database backends keyed by id.
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
    /// Sanitization policies keyed by entity type.
    #[serde(default)]
    pub sanitization: Vec<SanitizationConfig>,
}

impl QueryRelayConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit `path`, then [`CONFIG_ENV_VAR`], then
    /// `query-relay.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.approval.validate()?;
        self.audit.validate()?;
        if self.databases.is_empty() {
            return Err(ConfigError::Invalid("at least one [[databases]] entry required".to_string()));
        }
        if self.databases.len() > MAX_DATABASES {
            return Err(ConfigError::Invalid("too many databases".to_string()));
        }
        let mut ids = BTreeSet::new();
        for database in &self.databases {
            database.validate()?;
            if !ids.insert(database.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate database id: {}",
                    database.id
                )));
            }
        }
        if self.sanitization.len() > MAX_SANITIZATION_ENTRIES {
            return Err(ConfigError::Invalid("too many sanitization entries".to_string()));
        }
        let mut entities = BTreeSet::new();
        let mut tables = BTreeSet::new();
        for entry in &self.sanitization {
            entry.validate()?;
            if !entities.insert(entry.entity_type.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate sanitization entity_type: {}",
                    entry.entity_type
                )));
            }
            let table = entry.table_name();
            if !tables.insert(table.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate sanitization table: {table}"
                )));
            }
        }
        Ok(())
    }

    /// Returns the database entry for `id`.
    #[must_use]
    pub fn database(&self, id: &DatabaseId) -> Option<&DatabaseConfig> {
        self.databases.iter().find(|database| &database.id == id)
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Permit binding to a non-loopback address.
    #[serde(default)]
    pub allow_non_loopback: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            allow_non_loopback: false,
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("invalid bind address".to_string()))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid("max_body_bytes too large".to_string()));
        }
        let addr = self.bind_addr()?;
        if !addr.ip().is_loopback() && !self.allow_non_loopback {
            return Err(ConfigError::Invalid(
                "non-loopback bind requires server.allow_non_loopback".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Approval
// ============================================================================

/// Operator surface that answers approval requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Prompt on the gateway's controlling terminal.
    #[default]
    Terminal,
    /// Reject every write without prompting.
    DenyAll,
}

/// Approval gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalConfig {
    /// Operator surface.
    #[serde(default)]
    pub mode: ApprovalMode,
    /// Wait window before a pending approval times out.
    #[serde(default = "default_approval_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            mode: ApprovalMode::default(),
            timeout_ms: default_approval_timeout_ms(),
        }
    }
}

impl ApprovalConfig {
    /// Validates approval configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_APPROVAL_TIMEOUT_MS ..= MAX_APPROVAL_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "approval.timeout_ms must be between {MIN_APPROVAL_TIMEOUT_MS} and \
                 {MAX_APPROVAL_TIMEOUT_MS}",
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Enable structured audit logging.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional audit log path (JSON lines); stderr when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Databases
// ============================================================================

/// SQLite database backend entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Identifier clients send as `databaseId`.
    pub id: DatabaseId,
    /// SQLite file path.
    pub path: String,
    /// Open the database read-only.
    #[serde(default)]
    pub read_only: bool,
    /// Busy timeout for SQLite locks in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Validates a database entry.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier("databases.id", self.id.as_str())?;
        validate_path_string("databases.path", &self.path)
    }
}

// ============================================================================
// SECTION: Sanitization
// ============================================================================

/// Sanitization policy kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizationKind {
    /// Entity carries no sensitive data; rows pass unchanged.
    PassThrough,
    /// Listed columns are masked; others pass unchanged.
    ColumnMask,
}

/// Format-preserving mask applied to one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskRule {
    /// Letters become `X`, digits become `0`, other characters are kept.
    PreserveFormat,
    /// Every character becomes `*`.
    Fixed,
    /// Value becomes null.
    Null,
}

/// Sanitization entry for one entity type and its backing table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SanitizationConfig {
    /// Entity type the policy applies to.
    pub entity_type: EntityType,
    /// Backing table; defaults to the `snake_case` form of `entity_type`.
    #[serde(default)]
    pub table: Option<String>,
    /// Policy kind.
    pub policy: SanitizationKind,
    /// Column masks for [`SanitizationKind::ColumnMask`].
    #[serde(default)]
    pub columns: BTreeMap<String, MaskRule>,
}

impl SanitizationConfig {
    /// Returns the table whose columns this policy governs.
    #[must_use]
    pub fn table_name(&self) -> String {
        self.table.clone().unwrap_or_else(|| snake_case(self.entity_type.as_str()))
    }

    /// Validates a sanitization entry.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier("sanitization.entity_type", self.entity_type.as_str())?;
        validate_identifier("sanitization.table", &self.table_name())?;
        match self.policy {
            SanitizationKind::PassThrough if !self.columns.is_empty() => {
                Err(ConfigError::Invalid(format!(
                    "sanitization for {} is pass_through but lists columns",
                    self.entity_type
                )))
            }
            SanitizationKind::ColumnMask if self.columns.is_empty() => {
                Err(ConfigError::Invalid(format!(
                    "sanitization for {} is column_mask but lists no columns",
                    self.entity_type
                )))
            }
            _ => self
                .columns
                .keys()
                .try_for_each(|column| validate_identifier("sanitization.columns", column)),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a non-empty, bounded identifier without whitespace.
fn validate_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!("{field} must not contain whitespace")));
    }
    Ok(())
}

/// Converts `LedgerKey` style names to `ledger_key`.
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if previous_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            previous_lower = false;
        } else {
            out.push(ch);
            previous_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Default bind address.
fn default_bind() -> String {
    "127.0.0.1:8710".to_string()
}

/// Default maximum request body size in bytes.
const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Default approval wait window in milliseconds.
const fn default_approval_timeout_ms() -> u64 {
    5 * 60 * 1000
}

/// Default audit enablement.
const fn default_audit_enabled() -> bool {
    true
}

/// Default SQLite busy timeout in milliseconds.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}
