// crates/query-relay-core/src/query/statement.rs
// ============================================================================
// Module: Query Statements
// Description: Entity-typed SELECT, INSERT, UPDATE, and DELETE builders.
// Purpose: Compose statements fluently and serialize them in one call.
// Dependencies: crate::query::{expr, serializer}, crate::scalar
// ============================================================================

//! ## Overview
//! Builders are generic over the target [`Entity`], so the table and the
//! declared column set come from the type rather than from strings the caller
//! can mistype. Multiple `filter` calls are conjoined.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::marker::PhantomData;

use crate::query::Entity;
use crate::query::QueryError;
use crate::query::SerializedQuery;
use crate::query::StatementKind;
use crate::query::expr::ColumnRef;
use crate::query::expr::Direction;
use crate::query::expr::Predicate;
use crate::query::serializer::Scope;
use crate::query::serializer::SqlWriter;
use crate::scalar::ScalarValue;

// ============================================================================
// SECTION: Joins
// ============================================================================

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`.
    Inner,
    /// `LEFT JOIN`.
    Left,
}

impl JoinKind {
    /// Returns the SQL keywords.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// Joined entity with its join condition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Join {
    /// Join flavor.
    pub(crate) kind: JoinKind,
    /// Joined table.
    pub(crate) table: &'static str,
    /// Joined entity name.
    pub(crate) entity: &'static str,
    /// Columns declared on the joined entity.
    pub(crate) columns: &'static [&'static str],
    /// Join condition.
    pub(crate) on: Predicate,
}

/// Conjoins an optional predicate with a new one.
fn conjoin(current: Option<Predicate>, next: Predicate) -> Option<Predicate> {
    Some(match current {
        Some(existing) => existing.and(next),
        None => next,
    })
}

// ============================================================================
// SECTION: Select
// ============================================================================

/// `SELECT` over an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Select<E: Entity> {
    /// Explicit projection; `None` selects every declared column.
    columns: Option<Vec<String>>,
    /// Joined entities in declaration order.
    joins: Vec<Join>,
    /// Conjoined filter.
    predicate: Option<Predicate>,
    /// Sort keys.
    order_by: Vec<(String, Direction)>,
    /// Row limit.
    limit: Option<u64>,
    /// Row offset.
    offset: Option<u64>,
    /// Target entity.
    entity: PhantomData<E>,
}

impl<E: Entity> Default for Select<E> {
    fn default() -> Self {
        Self {
            columns: None,
            joins: Vec::new(),
            predicate: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            entity: PhantomData,
        }
    }
}

impl<E: Entity> Select<E> {
    /// Selects every declared column of `E`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the projection to the given columns.
    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|column| (*column).to_string()).collect());
        self
    }

    /// Adds a conjoined filter.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = conjoin(self.predicate.take(), predicate);
        self
    }

    /// Joins entity `J` on `on`.
    #[must_use]
    pub fn join<J: Entity>(mut self, kind: JoinKind, on: Predicate) -> Self {
        self.joins.push(Join {
            kind,
            table: J::TABLE,
            entity: J::ENTITY_TYPE,
            columns: J::COLUMNS,
            on,
        });
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order_by.push((column.to_string(), direction));
        self
    }

    /// Limits the number of rows returned.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips leading rows.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Compiles the statement.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for undeclared or ambiguous columns, an empty
    /// or repeating projection, invalid identifiers, null comparisons, or
    /// unsupported functions.
    pub fn serialize(&self) -> Result<SerializedQuery, QueryError> {
        let mut scope = Scope::new::<E>()?;
        for join in &self.joins {
            scope.add(join.table, join.entity, join.columns)?;
        }
        let mut writer = SqlWriter::new();
        writer.push("SELECT ");
        match &self.columns {
            Some(columns) => {
                let refs = projection::<E>(columns)?;
                writer.column_list(&scope, &refs)?;
            }
            None if self.joins.is_empty() => {
                writer.identifier_list(E::COLUMNS)?;
            }
            None => {
                let refs = E::COLUMNS
                    .iter()
                    .map(|column| ColumnRef {
                        table: Some(E::TABLE.to_string()),
                        name: (*column).to_string(),
                    })
                    .collect::<Vec<_>>();
                writer.column_list(&scope, &refs)?;
            }
        }
        writer.push(" FROM ");
        writer.push(E::TABLE);
        for join in &self.joins {
            writer.push(" ");
            writer.push(join.kind.as_sql());
            writer.push(" ");
            writer.push(join.table);
            writer.push(" ON ");
            writer.predicate(&scope, &join.on)?;
        }
        writer.where_clause(&scope, self.predicate.as_ref())?;
        if !self.order_by.is_empty() {
            writer.push(" ORDER BY ");
            for (index, (column, direction)) in self.order_by.iter().enumerate() {
                if index > 0 {
                    writer.push(", ");
                }
                writer.column(&scope, &ColumnRef::parse(column))?;
                writer.push(" ");
                writer.push(direction.as_sql());
            }
        }
        if let Some(limit) = self.limit {
            writer.push(" LIMIT ");
            writer.bind_paging(limit)?;
        }
        if let Some(offset) = self.offset {
            writer.push(" OFFSET ");
            writer.bind_paging(offset)?;
        }
        Ok(writer.finish(StatementKind::Select, E::ENTITY_TYPE))
    }
}

/// Parses an explicit projection; every result name must be distinct.
fn projection<E: Entity>(columns: &[String]) -> Result<Vec<ColumnRef>, QueryError> {
    if columns.is_empty() {
        return Err(QueryError::EmptyProjection(E::ENTITY_TYPE.to_string()));
    }
    let refs = columns.iter().map(|column| ColumnRef::parse(column)).collect::<Vec<_>>();
    let mut names = BTreeSet::new();
    for reference in &refs {
        if !names.insert(reference.name.as_str()) {
            return Err(QueryError::DuplicateOutputColumn(reference.name.clone()));
        }
    }
    Ok(refs)
}

// ============================================================================
// SECTION: Insert
// ============================================================================

/// `INSERT` of a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert<E: Entity> {
    /// Column assignments in declaration order.
    values: Vec<(String, ScalarValue)>,
    /// Target entity.
    entity: PhantomData<E>,
}

impl<E: Entity> Default for Insert<E> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            entity: PhantomData,
        }
    }
}

impl<E: Entity> Insert<E> {
    /// Starts an empty insert.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a column value.
    #[must_use]
    pub fn value(mut self, column: &str, value: impl Into<ScalarValue>) -> Self {
        self.values.push((column.to_string(), value.into()));
        self
    }

    /// Compiles the statement.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for undeclared or duplicate columns, or an
    /// insert without assignments.
    pub fn serialize(&self) -> Result<SerializedQuery, QueryError> {
        let scope = Scope::new::<E>()?;
        if self.values.is_empty() {
            return Err(QueryError::NoAssignments {
                statement: StatementKind::Insert.keyword(),
                entity: E::ENTITY_TYPE.to_string(),
            });
        }
        scope.check_assignments(&self.values)?;
        let mut writer = SqlWriter::new();
        writer.push("INSERT INTO ");
        writer.push(E::TABLE);
        writer.push(" (");
        let refs = self
            .values
            .iter()
            .map(|(column, _)| ColumnRef::parse(column))
            .collect::<Vec<_>>();
        writer.column_list(&scope, &refs)?;
        writer.push(") VALUES (");
        for (index, (_, value)) in self.values.iter().enumerate() {
            if index > 0 {
                writer.push(", ");
            }
            writer.bind(value.clone());
        }
        writer.push(")");
        Ok(writer.finish(StatementKind::Insert, E::ENTITY_TYPE))
    }
}

// ============================================================================
// SECTION: Update
// ============================================================================

/// `UPDATE` of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<E: Entity> {
    /// Column assignments in declaration order.
    assignments: Vec<(String, ScalarValue)>,
    /// Conjoined filter.
    predicate: Option<Predicate>,
    /// Caller opted into touching every row.
    all_rows: bool,
    /// Target entity.
    entity: PhantomData<E>,
}

impl<E: Entity> Default for Update<E> {
    fn default() -> Self {
        Self {
            assignments: Vec::new(),
            predicate: None,
            all_rows: false,
            entity: PhantomData,
        }
    }
}

impl<E: Entity> Update<E> {
    /// Starts an update with no assignments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a column value; a null value binds a null parameter.
    #[must_use]
    pub fn set(mut self, column: &str, value: impl Into<ScalarValue>) -> Self {
        self.assignments.push((column.to_string(), value.into()));
        self
    }

    /// Adds a conjoined filter.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = conjoin(self.predicate.take(), predicate);
        self
    }

    /// Permits an update without a predicate.
    #[must_use]
    pub const fn allow_all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }

    /// Compiles the statement.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for invalid columns, missing assignments, or a
    /// missing predicate without [`Update::allow_all_rows`].
    pub fn serialize(&self) -> Result<SerializedQuery, QueryError> {
        let scope = Scope::new::<E>()?;
        if self.assignments.is_empty() {
            return Err(QueryError::NoAssignments {
                statement: StatementKind::Update.keyword(),
                entity: E::ENTITY_TYPE.to_string(),
            });
        }
        if self.predicate.is_none() && !self.all_rows {
            return Err(QueryError::UnboundedMutation {
                statement: StatementKind::Update.keyword(),
                entity: E::ENTITY_TYPE.to_string(),
            });
        }
        scope.check_assignments(&self.assignments)?;
        let mut writer = SqlWriter::new();
        writer.push("UPDATE ");
        writer.push(E::TABLE);
        writer.push(" SET ");
        for (index, (column, value)) in self.assignments.iter().enumerate() {
            if index > 0 {
                writer.push(", ");
            }
            writer.column(&scope, &ColumnRef::parse(column))?;
            writer.push(" = ");
            writer.bind(value.clone());
        }
        writer.where_clause(&scope, self.predicate.as_ref())?;
        Ok(writer.finish(StatementKind::Update, E::ENTITY_TYPE))
    }
}

// ============================================================================
// SECTION: Delete
// ============================================================================

/// `DELETE` of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete<E: Entity> {
    /// Conjoined filter.
    predicate: Option<Predicate>,
    /// Caller opted into touching every row.
    all_rows: bool,
    /// Target entity.
    entity: PhantomData<E>,
}

impl<E: Entity> Default for Delete<E> {
    fn default() -> Self {
        Self {
            predicate: None,
            all_rows: false,
            entity: PhantomData,
        }
    }
}

impl<E: Entity> Delete<E> {
    /// Starts a delete with no predicate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a conjoined filter.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = conjoin(self.predicate.take(), predicate);
        self
    }

    /// Permits a delete without a predicate.
    #[must_use]
    pub const fn allow_all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }

    /// Compiles the statement.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for invalid predicates, or a missing predicate
    /// without [`Delete::allow_all_rows`].
    pub fn serialize(&self) -> Result<SerializedQuery, QueryError> {
        let scope = Scope::new::<E>()?;
        if self.predicate.is_none() && !self.all_rows {
            return Err(QueryError::UnboundedMutation {
                statement: StatementKind::Delete.keyword(),
                entity: E::ENTITY_TYPE.to_string(),
            });
        }
        let mut writer = SqlWriter::new();
        writer.push("DELETE FROM ");
        writer.push(E::TABLE);
        writer.where_clause(&scope, self.predicate.as_ref())?;
        Ok(writer.finish(StatementKind::Delete, E::ENTITY_TYPE))
    }
}
