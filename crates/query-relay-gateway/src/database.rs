// crates/query-relay-gateway/src/database.rs
// ============================================================================
// Module: Database Backends
// Description: Database trait, SQLite backend, and id-keyed catalog.
// Purpose: Execute parameterized statements on behalf of remote clients.
// Dependencies: query-relay-core, query-relay-config, rusqlite
// ============================================================================

//! ## Overview
//! Backends are synchronous; the gateway runs them on blocking tasks. The
//! [`DatabaseCatalog`] maps `databaseId` values to backends and is the only
//! place connection details are resolved.
//!
//! Invariants:
//! - Parameters are always bound, never interpolated.
//! - A statement run through [`Database::query`] must be read-only according
//!   to the backend itself.
//! - Reads report where every result column came from, so sanitization is
//!   decided by source table rather than by anything the caller declares.
//! - Result column names are unique within a read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use query_relay_config::DatabaseConfig;
use query_relay_core::DatabaseId;
use query_relay_core::Row;
use query_relay_core::ScalarValue;
use query_relay_core::WireValue;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::ToSql;
use rusqlite::types::Value;
use rusqlite::types::ValueRef;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Backend execution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatabaseError {
    /// Backend could not be opened.
    #[error("database open failed: {0}")]
    Open(String),
    /// Backend rejected or failed the statement.
    #[error("database error: {0}")]
    Backend(String),
    /// Parameter name is not a plain identifier.
    #[error("invalid parameter name: {0}")]
    InvalidParameter(String),
    /// Statement placeholders do not match the supplied parameters.
    #[error("statement expects {expected} parameters, {supplied} supplied")]
    ParameterCount {
        /// Placeholders in the statement.
        expected: usize,
        /// Parameters supplied by the caller.
        supplied: usize,
    },
    /// Statement sent as a read would modify the database.
    #[error("statement is not read-only")]
    NotReadOnly,
    /// Two result columns share one name.
    #[error("result column {0} appears more than once; alias one of them")]
    DuplicateColumn(String),
    /// Column holds a value the codec cannot carry.
    #[error("column {column} has unsupported type {kind}")]
    UnsupportedColumn {
        /// Column name.
        column: String,
        /// Backend type label.
        kind: &'static str,
    },
}

// ============================================================================
// SECTION: Query Output
// ============================================================================

/// Source of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnOrigin {
    /// Result column name as it appears in each row.
    pub name: String,
    /// Table the value is read from; `None` for computed columns.
    pub table: Option<String>,
    /// Column within `table`.
    pub column: Option<String>,
}

impl ColumnOrigin {
    /// Creates an origin for a column read directly from `table`.
    #[must_use]
    pub fn table_column(name: &str, table: &str, column: &str) -> Self {
        Self {
            name: name.to_string(),
            table: Some(table.to_string()),
            column: Some(column.to_string()),
        }
    }

    /// Creates an origin for a computed column.
    #[must_use]
    pub fn computed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: None,
            column: None,
        }
    }
}

/// Rows returned by a read, with the origin of every column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// Result columns in select order.
    pub columns: Vec<ColumnOrigin>,
    /// Rows keyed by result column name.
    pub rows: Vec<Row>,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Synchronous database backend.
pub trait Database: Send + Sync {
    /// Runs a read statement and returns its rows and column origins.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError`] when binding or execution fails, or when
    /// two result columns share a name.
    fn query(
        &self,
        sql: &str,
        parameters: &BTreeMap<String, ScalarValue>,
    ) -> Result<QueryOutput, DatabaseError>;

    /// Runs a write statement and returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError`] when binding or execution fails.
    fn execute(
        &self,
        sql: &str,
        parameters: &BTreeMap<String, ScalarValue>,
    ) -> Result<u64, DatabaseError>;

    /// Returns true when the backend refuses writes.
    fn read_only(&self) -> bool {
        false
    }
}

// ============================================================================
// SECTION: SQLite Backend
// ============================================================================

/// `SQLite`-backed database.
pub struct SqliteDatabase {
    /// Shared connection guarded by a mutex.
    connection: Mutex<Connection>,
    /// Connection opened read-only.
    read_only: bool,
}

impl SqliteDatabase {
    /// Opens a database file.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Open`] when the file cannot be opened.
    pub fn open(path: &Path, read_only: bool, busy_timeout_ms: u64) -> Result<Self, DatabaseError> {
        let flags = if read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_FULL_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX
        };
        let connection = Connection::open_with_flags(path, flags)
            .map_err(|err| DatabaseError::Open(err.to_string()))?;
        connection
            .busy_timeout(Duration::from_millis(busy_timeout_ms))
            .map_err(|err| DatabaseError::Open(err.to_string()))?;
        Ok(Self {
            connection: Mutex::new(connection),
            read_only,
        })
    }

    /// Opens the database described by a config entry.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Open`] when the file cannot be opened.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        Self::open(Path::new(config.path.trim()), config.read_only, config.busy_timeout_ms)
    }

    /// Locks the connection.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DatabaseError> {
        self.connection.lock().map_err(|_| DatabaseError::Backend("mutex poisoned".to_string()))
    }
}

impl Database for SqliteDatabase {
    fn query(
        &self,
        sql: &str,
        parameters: &BTreeMap<String, ScalarValue>,
    ) -> Result<QueryOutput, DatabaseError> {
        let bound = bind_values(parameters)?;
        let guard = self.lock()?;
        let mut statement = guard.prepare(sql).map_err(backend)?;
        if !statement.readonly() {
            return Err(DatabaseError::NotReadOnly);
        }
        check_parameter_count(statement.parameter_count(), bound.len())?;
        let columns: Vec<ColumnOrigin> = statement
            .columns_with_metadata()
            .iter()
            .map(|meta| ColumnOrigin {
                name: meta.name().to_string(),
                table: meta.table_name().map(str::to_string),
                column: meta.origin_name().map(str::to_string),
            })
            .collect();
        check_distinct_names(&columns)?;
        let params = as_params(&bound);
        let mut rows = statement.query(params.as_slice()).map_err(backend)?;
        let mut output = Vec::new();
        while let Some(row) = rows.next().map_err(backend)? {
            let mut record = Row::new();
            for (index, column) in columns.iter().enumerate() {
                let value = row.get_ref(index).map_err(backend)?;
                record.insert(column.name.clone(), column_value(&column.name, value)?);
            }
            output.push(record);
        }
        Ok(QueryOutput {
            columns,
            rows: output,
        })
    }

    fn execute(
        &self,
        sql: &str,
        parameters: &BTreeMap<String, ScalarValue>,
    ) -> Result<u64, DatabaseError> {
        let bound = bind_values(parameters)?;
        let guard = self.lock()?;
        let mut statement = guard.prepare(sql).map_err(backend)?;
        check_parameter_count(statement.parameter_count(), bound.len())?;
        let params = as_params(&bound);
        let changed = statement.execute(params.as_slice()).map_err(backend)?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    fn read_only(&self) -> bool {
        self.read_only
    }
}

/// Maps a rusqlite error to a backend error.
fn backend(err: rusqlite::Error) -> DatabaseError {
    DatabaseError::Backend(err.to_string())
}

/// Rejects placeholder/parameter count mismatches.
const fn check_parameter_count(expected: usize, supplied: usize) -> Result<(), DatabaseError> {
    if expected == supplied {
        Ok(())
    } else {
        Err(DatabaseError::ParameterCount {
            expected,
            supplied,
        })
    }
}

/// Rejects result sets where two columns would collapse into one row key.
fn check_distinct_names(columns: &[ColumnOrigin]) -> Result<(), DatabaseError> {
    let mut seen = BTreeSet::new();
    for column in columns {
        if !seen.insert(column.name.as_str()) {
            return Err(DatabaseError::DuplicateColumn(column.name.clone()));
        }
    }
    Ok(())
}

/// Converts wire parameters into named `SQLite` values.
fn bind_values(
    parameters: &BTreeMap<String, ScalarValue>,
) -> Result<Vec<(String, Value)>, DatabaseError> {
    parameters
        .iter()
        .map(|(name, value)| {
            let mut chars = name.chars();
            let valid = chars.next().is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_')
                && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
            if !valid {
                return Err(DatabaseError::InvalidParameter(name.clone()));
            }
            Ok((format!(":{name}"), sql_value(value)))
        })
        .collect()
}

/// Borrows bound values as rusqlite named parameters.
fn as_params(bound: &[(String, Value)]) -> Vec<(&str, &dyn ToSql)> {
    bound.iter().map(|(name, value)| (name.as_str(), value as &dyn ToSql)).collect()
}

/// Converts a scalar parameter into a `SQLite` value.
fn sql_value(value: &ScalarValue) -> Value {
    match value {
        ScalarValue::Null => Value::Null,
        ScalarValue::Bool(flag) => Value::Integer(i64::from(*flag)),
        ScalarValue::Integer(number) => Value::Integer(*number),
        ScalarValue::Float(number) => Value::Real(*number),
        ScalarValue::Text(text) => Value::Text(text.clone()),
        other => other.text_form().map_or(Value::Null, Value::Text),
    }
}

/// Converts a `SQLite` column value into a wire value.
fn column_value(column: &str, value: ValueRef<'_>) -> Result<WireValue, DatabaseError> {
    match value {
        ValueRef::Null => Ok(WireValue::Null),
        ValueRef::Integer(number) => Ok(WireValue::Integer(number)),
        ValueRef::Real(number) => Ok(WireValue::Float(number)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|text| WireValue::String(text.to_string()))
            .map_err(|_| DatabaseError::UnsupportedColumn {
                column: column.to_string(),
                kind: "non-utf8 text",
            }),
        ValueRef::Blob(_) => Err(DatabaseError::UnsupportedColumn {
            column: column.to_string(),
            kind: "blob",
        }),
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Maps database identifiers to backends.
#[derive(Clone, Default)]
pub struct DatabaseCatalog {
    /// Registered backends.
    backends: BTreeMap<DatabaseId, Arc<dyn Database>>,
}

impl DatabaseCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens every configured database.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Open`] naming the first database that fails.
    pub fn from_config(configs: &[DatabaseConfig]) -> Result<Self, DatabaseError> {
        let mut catalog = Self::new();
        for config in configs {
            let database = SqliteDatabase::from_config(config)
                .map_err(|err| DatabaseError::Open(format!("{}: {err}", config.id)))?;
            catalog.insert(config.id.clone(), Arc::new(database));
        }
        Ok(catalog)
    }

    /// Registers a backend, replacing any previous one with the same id.
    pub fn insert(&mut self, id: DatabaseId, database: Arc<dyn Database>) {
        self.backends.insert(id, database);
    }

    /// Returns the backend for `id`.
    #[must_use]
    pub fn get(&self, id: &DatabaseId) -> Option<Arc<dyn Database>> {
        self.backends.get(id).cloned()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
