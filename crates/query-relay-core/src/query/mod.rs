// crates/query-relay-core/src/query/mod.rs
// ============================================================================
// Module: Query Serializer
// Description: Entity-typed statements compiled to SQL text plus parameters.
// Purpose: Produce portable, injection-free SerializedQuery values.
// Dependencies: serde, thiserror, crate::{identifiers, scalar}
// ============================================================================

//! ## Overview
//! Callers compose a [`Select`], [`Insert`], [`Update`], or [`Delete`] over an
//! [`Entity`] and call `serialize()`. The result is a [`SerializedQuery`]:
//! SQL text with `:pN` placeholders and a map holding one entry per bound
//! literal.
//!
//! Invariants:
//! - No literal is ever inlined into SQL text.
//! - Placeholders are numbered in a fixed traversal order (assignments, join
//!   conditions, predicates, paging), so equal statements serialize to
//!   byte-identical SQL.
//! - Equal literals in two positions bind two distinct parameters.
//! - Unsupported constructs fail with [`QueryError`]; there is no
//!   best-effort output.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod expr;
mod serializer;
pub mod statement;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::identifiers::EntityType;
use crate::scalar::ScalarValue;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use expr::ColumnRef;
pub use expr::CompareOp;
pub use expr::Direction;
pub use expr::Operand;
pub use expr::Predicate;
pub use expr::col;
pub use expr::func;
pub use expr::lit;
pub use statement::Delete;
pub use statement::Insert;
pub use statement::JoinKind;
pub use statement::Select;
pub use statement::Update;

// ============================================================================
// SECTION: Entities
// ============================================================================

/// Table-backed entity type a statement targets.
///
/// # Invariants
/// - `TABLE` and every entry of `COLUMNS` are plain SQL identifiers.
pub trait Entity {
    /// Entity type name carried on the serialized query.
    const ENTITY_TYPE: &'static str;
    /// Backing table.
    const TABLE: &'static str;
    /// Declared columns in select order.
    const COLUMNS: &'static [&'static str];
}

// ============================================================================
// SECTION: Serialized Query
// ============================================================================

/// Statement kind of a serialized query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// `SELECT`.
    Select,
    /// `INSERT`.
    Insert,
    /// `UPDATE`.
    Update,
    /// `DELETE`.
    Delete,
}

impl StatementKind {
    /// Returns true for statements that mutate stored data.
    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Select)
    }

    /// Returns the leading SQL keyword.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// SQL text with its bound parameters.
///
/// # Invariants
/// - Every `:name` placeholder in `sql_text` has exactly one entry in
///   `parameters` under `name`, and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedQuery {
    /// SQL text with `:pN` placeholders.
    pub sql_text: String,
    /// Bound values keyed by placeholder name without the leading colon.
    pub parameters: BTreeMap<String, ScalarValue>,
    /// Statement kind.
    pub statement: StatementKind,
    /// Entity the statement targets.
    pub entity: EntityType,
}

impl SerializedQuery {
    /// Returns true when the statement mutates stored data.
    #[must_use]
    pub const fn write_intent(&self) -> bool {
        self.statement.is_write()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Query serialization failures.
///
/// # Invariants
/// - Every variant is a caller bug; nothing here is retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Identifier is not a plain SQL identifier.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// Column is not declared on the entity it refers to.
    #[error("column {column} is not declared on {entity}")]
    UnknownColumn {
        /// Entity searched.
        entity: String,
        /// Column name.
        column: String,
    },
    /// Qualified column names a table that is not part of the statement.
    #[error("table {0} is not part of this statement")]
    UnknownTable(String),
    /// Literal null used in a comparison.
    #[error("comparison with null literal; use is_null() or is_not_null() instead")]
    NullComparison,
    /// Literal null used in an IN list.
    #[error("null literal in IN list; combine with is_null() instead")]
    NullInList,
    /// Function outside the supported set.
    #[error("unsupported function: {0}")]
    UnsupportedFunction(String),
    /// Function called with the wrong number of arguments.
    #[error("function {name} expects {expected} arguments, got {found}")]
    FunctionArity {
        /// Function name.
        name: String,
        /// Expected arity description.
        expected: &'static str,
        /// Supplied argument count.
        found: usize,
    },
    /// Construct the serializer never renders.
    #[error("unsupported construct: {0}")]
    Unsupported(String),
    /// Update or delete without a predicate.
    #[error("{statement} on {entity} has no predicate; call allow_all_rows() to affect every row")]
    UnboundedMutation {
        /// Statement keyword.
        statement: &'static str,
        /// Entity name.
        entity: String,
    },
    /// Insert or update without any assignment.
    #[error("{statement} on {entity} assigns no columns")]
    NoAssignments {
        /// Statement keyword.
        statement: &'static str,
        /// Entity name.
        entity: String,
    },
    /// Column assigned twice in one statement.
    #[error("column {0} is assigned twice")]
    DuplicateAssignment(String),
    /// Unqualified column declared on more than one table in scope.
    #[error("column {column} is ambiguous between {first} and {second}; qualify it with a table")]
    AmbiguousColumn {
        /// Column name.
        column: String,
        /// First table declaring the column.
        first: String,
        /// Second table declaring the column.
        second: String,
    },
    /// Two projected columns would share one result name.
    #[error("result column {0} is selected twice")]
    DuplicateOutputColumn(String),
    /// Select with an explicitly empty projection.
    #[error("SELECT on {0} projects no columns")]
    EmptyProjection(String),
    /// Paging value outside the bindable range.
    #[error("paging value out of range: {0}")]
    InvalidPaging(u64),
}
