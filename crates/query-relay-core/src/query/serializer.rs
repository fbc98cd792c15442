// crates/query-relay-core/src/query/serializer.rs
// ============================================================================
// Module: SQL Writer
// Description: Name resolution and SQL text rendering for query statements.
// Purpose: Render expressions deterministically while binding every literal.
// Dependencies: crate::query::{expr, statement}, crate::scalar
// ============================================================================

//! ## Overview
//! [`SqlWriter`] appends SQL text left to right and binds literals as it
//! meets them, so placeholder numbers follow text order. [`Scope`] knows
//! which tables a statement can see and rejects anything else.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::identifiers::EntityType;
use crate::query::Entity;
use crate::query::QueryError;
use crate::query::SerializedQuery;
use crate::query::StatementKind;
use crate::query::expr::ColumnRef;
use crate::query::expr::Operand;
use crate::query::expr::Predicate;
use crate::scalar::ScalarValue;

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// Checks `[A-Za-z_][A-Za-z0-9_]*`.
fn check_identifier(identifier: &str) -> Result<(), QueryError> {
    let mut chars = identifier.chars();
    let valid = chars.next().is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(QueryError::InvalidIdentifier(identifier.to_string()))
    }
}

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Table visible to a statement.
struct ScopedTable {
    /// Table name.
    table: &'static str,
    /// Entity name for diagnostics.
    entity: &'static str,
    /// Declared columns.
    columns: &'static [&'static str],
}

/// Tables a statement may reference; the first entry is the target.
pub(crate) struct Scope {
    /// Visible tables in declaration order.
    tables: Vec<ScopedTable>,
}

impl Scope {
    /// Creates a scope holding only `E`.
    pub(crate) fn new<E: Entity>() -> Result<Self, QueryError> {
        let mut scope = Self {
            tables: Vec::new(),
        };
        scope.add(E::TABLE, E::ENTITY_TYPE, E::COLUMNS)?;
        Ok(scope)
    }

    /// Adds a joined table.
    pub(crate) fn add(
        &mut self,
        table: &'static str,
        entity: &'static str,
        columns: &'static [&'static str],
    ) -> Result<(), QueryError> {
        check_identifier(table)?;
        columns.iter().try_for_each(|column| check_identifier(column))?;
        self.tables.push(ScopedTable {
            table,
            entity,
            columns,
        });
        Ok(())
    }

    /// Returns true when the statement joins other tables.
    fn is_joined(&self) -> bool {
        self.tables.len() > 1
    }

    /// Resolves a column reference and returns the table that declares it.
    ///
    /// An unqualified name must be declared on exactly one visible table.
    fn resolve(&self, column: &ColumnRef) -> Result<&'static str, QueryError> {
        check_identifier(&column.name)?;
        let name = column.name.as_str();
        if let Some(table) = &column.table {
            check_identifier(table)?;
            let scoped = self
                .tables
                .iter()
                .find(|scoped| scoped.table == table.as_str())
                .ok_or_else(|| QueryError::UnknownTable(table.clone()))?;
            return if scoped.columns.contains(&name) {
                Ok(scoped.table)
            } else {
                Err(QueryError::UnknownColumn {
                    entity: scoped.entity.to_string(),
                    column: column.name.clone(),
                })
            };
        }
        let mut declaring = self.tables.iter().filter(|scoped| scoped.columns.contains(&name));
        match (declaring.next(), declaring.next()) {
            (Some(scoped), None) => Ok(scoped.table),
            (Some(first), Some(second)) => Err(QueryError::AmbiguousColumn {
                column: column.name.clone(),
                first: first.table.to_string(),
                second: second.table.to_string(),
            }),
            (None, _) => {
                let target =
                    self.tables.first().ok_or_else(|| QueryError::UnknownTable(String::new()))?;
                Err(QueryError::UnknownColumn {
                    entity: target.entity.to_string(),
                    column: column.name.clone(),
                })
            }
        }
    }

    /// Validates assignment targets: declared on the target and unique.
    pub(crate) fn check_assignments(
        &self,
        assignments: &[(String, ScalarValue)],
    ) -> Result<(), QueryError> {
        let mut seen = BTreeSet::new();
        for (column, _) in assignments {
            let reference = ColumnRef::parse(column);
            if reference.table.is_some() {
                return Err(QueryError::InvalidIdentifier(column.clone()));
            }
            self.resolve(&reference)?;
            if !seen.insert(column.as_str()) {
                return Err(QueryError::DuplicateAssignment(column.clone()));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Functions
// ============================================================================

/// Checks a scalar function name and arity, returning its rendered name.
fn check_function(name: &str, arity: usize) -> Result<&'static str, QueryError> {
    let (rendered, expected, ok) = match name.to_ascii_lowercase().as_str() {
        "lower" => ("LOWER", "exactly 1", arity == 1),
        "upper" => ("UPPER", "exactly 1", arity == 1),
        "length" => ("LENGTH", "exactly 1", arity == 1),
        "coalesce" => ("COALESCE", "at least 2", arity >= 2),
        _ => return Err(QueryError::UnsupportedFunction(name.to_string())),
    };
    if ok {
        Ok(rendered)
    } else {
        Err(QueryError::FunctionArity {
            name: name.to_string(),
            expected,
            found: arity,
        })
    }
}

/// Validates an operand without binding anything.
fn check_operand(scope: &Scope, operand: &Operand) -> Result<(), QueryError> {
    match operand {
        Operand::Column(column) => scope.resolve(column).map(|_| ()),
        Operand::Literal(_) => Ok(()),
        Operand::Function {
            name,
            args,
        } => {
            check_function(name, args.len())?;
            args.iter().try_for_each(|arg| check_operand(scope, arg))
        }
        Operand::Window {
            name, ..
        } => Err(QueryError::Unsupported(format!("window function {name}"))),
    }
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Accumulates SQL text and bound parameters.
pub(crate) struct SqlWriter {
    /// SQL text so far.
    sql: String,
    /// Bound parameters keyed by placeholder name.
    parameters: BTreeMap<String, ScalarValue>,
    /// Next placeholder index.
    next: usize,
}

impl SqlWriter {
    /// Creates an empty writer.
    pub(crate) const fn new() -> Self {
        Self {
            sql: String::new(),
            parameters: BTreeMap::new(),
            next: 0,
        }
    }

    /// Appends raw SQL text.
    pub(crate) fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Binds a literal to the next placeholder and writes the placeholder.
    pub(crate) fn bind(&mut self, value: ScalarValue) {
        let name = format!("p{}", self.next);
        self.next += 1;
        self.sql.push(':');
        self.sql.push_str(&name);
        self.parameters.insert(name, value);
    }

    /// Binds a paging value.
    pub(crate) fn bind_paging(&mut self, value: u64) -> Result<(), QueryError> {
        let value = i64::try_from(value).map_err(|_| QueryError::InvalidPaging(value))?;
        self.bind(ScalarValue::Integer(value));
        Ok(())
    }

    /// Writes a comma-separated list of bare identifiers.
    pub(crate) fn identifier_list(&mut self, identifiers: &[&str]) -> Result<(), QueryError> {
        for (index, identifier) in identifiers.iter().enumerate() {
            check_identifier(identifier)?;
            if index > 0 {
                self.push(", ");
            }
            self.push(identifier);
        }
        Ok(())
    }

    /// Writes a comma-separated list of resolved columns.
    pub(crate) fn column_list(
        &mut self,
        scope: &Scope,
        columns: &[ColumnRef],
    ) -> Result<(), QueryError> {
        for (index, column) in columns.iter().enumerate() {
            if index > 0 {
                self.push(", ");
            }
            self.column(scope, column)?;
        }
        Ok(())
    }

    /// Writes a resolved column reference, qualified whenever tables are joined.
    pub(crate) fn column(&mut self, scope: &Scope, column: &ColumnRef) -> Result<(), QueryError> {
        let table = scope.resolve(column)?;
        if column.table.is_some() || scope.is_joined() {
            self.sql.push_str(table);
            self.sql.push('.');
        }
        self.sql.push_str(&column.name);
        Ok(())
    }

    /// Writes ` WHERE <predicate>` when a predicate is present.
    pub(crate) fn where_clause(
        &mut self,
        scope: &Scope,
        predicate: Option<&Predicate>,
    ) -> Result<(), QueryError> {
        if let Some(predicate) = predicate {
            self.push(" WHERE ");
            self.predicate(scope, predicate)?;
        }
        Ok(())
    }

    /// Writes a predicate.
    pub(crate) fn predicate(
        &mut self,
        scope: &Scope,
        predicate: &Predicate,
    ) -> Result<(), QueryError> {
        match predicate {
            Predicate::Compare {
                left,
                op,
                right,
            } => {
                let null = Operand::Literal(ScalarValue::Null);
                if *left == null || *right == null {
                    return Err(QueryError::NullComparison);
                }
                self.operand(scope, left)?;
                self.push(" ");
                self.push(op.as_sql());
                self.push(" ");
                self.operand(scope, right)
            }
            Predicate::In {
                operand,
                values,
                negated,
            } => {
                if values.iter().any(ScalarValue::is_null) {
                    return Err(QueryError::NullInList);
                }
                if values.is_empty() {
                    check_operand(scope, operand)?;
                    self.push(if *negated { "1 = 1" } else { "1 = 0" });
                    return Ok(());
                }
                self.operand(scope, operand)?;
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        self.push(", ");
                    }
                    self.bind(value.clone());
                }
                self.push(")");
                Ok(())
            }
            Predicate::IsNull {
                operand,
                negated,
            } => {
                self.operand(scope, operand)?;
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
                Ok(())
            }
            Predicate::And(items) => self.junction(scope, items, " AND ", "1 = 1"),
            Predicate::Or(items) => self.junction(scope, items, " OR ", "1 = 0"),
            Predicate::Not(inner) => {
                self.push("NOT (");
                self.predicate(scope, inner)?;
                self.push(")");
                Ok(())
            }
        }
    }

    /// Writes a conjunction or disjunction, parenthesizing compound children.
    fn junction(
        &mut self,
        scope: &Scope,
        items: &[Predicate],
        separator: &str,
        empty: &str,
    ) -> Result<(), QueryError> {
        if items.is_empty() {
            self.push(empty);
            return Ok(());
        }
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                self.push(separator);
            }
            let compound = matches!(item, Predicate::And(_) | Predicate::Or(_));
            if compound {
                self.push("(");
            }
            self.predicate(scope, item)?;
            if compound {
                self.push(")");
            }
        }
        Ok(())
    }

    /// Writes an operand, binding literals.
    fn operand(&mut self, scope: &Scope, operand: &Operand) -> Result<(), QueryError> {
        match operand {
            Operand::Column(column) => self.column(scope, column),
            Operand::Literal(value) => {
                self.bind(value.clone());
                Ok(())
            }
            Operand::Function {
                name,
                args,
            } => {
                let rendered = check_function(name, args.len())?;
                self.push(rendered);
                self.push("(");
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        self.push(", ");
                    }
                    self.operand(scope, arg)?;
                }
                self.push(")");
                Ok(())
            }
            Operand::Window {
                name, ..
            } => Err(QueryError::Unsupported(format!("window function {name}"))),
        }
    }

    /// Produces the serialized query.
    pub(crate) fn finish(self, statement: StatementKind, entity: &str) -> SerializedQuery {
        SerializedQuery {
            sql_text: self.sql,
            parameters: self.parameters,
            statement,
            entity: EntityType::new(entity),
        }
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

    use crate::query::Delete;
    use crate::query::Direction;
    use crate::query::Entity;
    use crate::query::Insert;
    use crate::query::JoinKind;
    use crate::query::QueryError;
    use crate::query::Select;
    use crate::query::Update;
    use crate::query::col;
    use crate::query::func;
    use crate::query::lit;
    use crate::scalar::ScalarValue;

    #[derive(Debug, Clone, PartialEq)]
    struct Acceptance;

    impl Entity for Acceptance {
        const ENTITY_TYPE: &'static str = "Acceptance";
        const TABLE: &'static str = "acceptance";
        const COLUMNS: &'static [&'static str] = &["id", "agreement_id", "signer_name"];
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Agreement;

    impl Entity for Agreement {
        const ENTITY_TYPE: &'static str = "Agreement";
        const TABLE: &'static str = "agreement";
        const COLUMNS: &'static [&'static str] = &["id", "title"];
    }

    #[test]
    fn select_binds_literal_as_first_parameter() {
        let query =
            Select::<Acceptance>::new().filter(col("agreement_id").eq("X")).serialize().unwrap();
        assert_eq!(
            query.sql_text,
            "SELECT id, agreement_id, signer_name FROM acceptance WHERE agreement_id = :p0"
        );
        assert_eq!(query.parameters.get("p0"), Some(&ScalarValue::Text("X".to_string())));
        assert!(!query.write_intent());
    }

    #[test]
    fn null_tests_bind_nothing() {
        let query = Select::<Acceptance>::new()
            .filter(col("signer_name").is_null().or(col("id").is_not_null()))
            .serialize()
            .unwrap();
        assert!(query.sql_text.ends_with("WHERE signer_name IS NULL OR id IS NOT NULL"));
        assert!(query.parameters.is_empty());
    }

    #[test]
    fn in_expands_one_parameter_per_element() {
        let query =
            Select::<Acceptance>::new().filter(col("id").is_in([1_i64, 2, 3])).serialize().unwrap();
        assert!(query.sql_text.ends_with("WHERE id IN (:p0, :p1, :p2)"));
        assert_eq!(query.parameters.len(), 3);
    }

    #[test]
    fn empty_in_renders_constant_predicate() {
        let empty: [i64; 0] = [];
        let query = Select::<Acceptance>::new().filter(col("id").is_in(empty)).serialize().unwrap();
        assert!(query.sql_text.ends_with("WHERE 1 = 0"));
        let query = Select::<Acceptance>::new().filter(col("id").not_in(empty)).serialize().unwrap();
        assert!(query.sql_text.ends_with("WHERE 1 = 1"));
    }

    #[test]
    fn null_literal_comparison_is_rejected() {
        let err = Select::<Acceptance>::new()
            .filter(col("signer_name").eq(None::<String>))
            .serialize()
            .unwrap_err();
        assert_eq!(err, QueryError::NullComparison);
    }

    #[test]
    fn undeclared_column_fails_fast() {
        let err =
            Select::<Acceptance>::new().filter(col("password").eq("x")).serialize().unwrap_err();
        assert!(matches!(err, QueryError::UnknownColumn { .. }));
    }

    #[test]
    fn window_and_unknown_functions_are_rejected() {
        let window = func("row_number", []).over(&["agreement_id"]);
        let err = Select::<Acceptance>::new().filter(window.gt(1_i64)).serialize().unwrap_err();
        assert!(matches!(err, QueryError::Unsupported(_)));
        let err = Select::<Acceptance>::new()
            .filter(func("soundex", [col("signer_name")]).eq("x"))
            .serialize()
            .unwrap_err();
        assert_eq!(err, QueryError::UnsupportedFunction("soundex".to_string()));
    }

    #[test]
    fn functions_render_uppercase_and_bind_arguments() {
        let query = Select::<Acceptance>::new()
            .filter(func("lower", [col("signer_name")]).eq("ann"))
            .filter(func("coalesce", [col("signer_name"), lit("anon")]).ne("bob"))
            .serialize()
            .unwrap();
        assert!(query.sql_text.ends_with(
            "WHERE LOWER(signer_name) = :p0 AND COALESCE(signer_name, :p1) <> :p2"
        ));
    }

    #[test]
    fn join_then_predicate_then_paging_order() {
        let query = Select::<Acceptance>::new()
            .columns(&["acceptance.id", "agreement.title"])
            .join::<Agreement>(
                JoinKind::Inner,
                col("agreement.id")
                    .eq(col("acceptance.agreement_id"))
                    .and(col("agreement.title").ne("draft")),
            )
            .filter(col("acceptance.signer_name").eq("ann"))
            .order_by("acceptance.id", Direction::Desc)
            .limit(10)
            .offset(20)
            .serialize()
            .unwrap();
        assert_eq!(
            query.sql_text,
            "SELECT acceptance.id, agreement.title FROM acceptance INNER JOIN agreement ON \
             agreement.id = acceptance.agreement_id AND agreement.title <> :p0 WHERE \
             acceptance.signer_name = :p1 ORDER BY acceptance.id DESC LIMIT :p2 OFFSET :p3"
        );
        assert_eq!(query.parameters.get("p2"), Some(&ScalarValue::Integer(10)));
    }

    #[test]
    fn joined_statements_qualify_unambiguous_columns() {
        let query = Select::<Acceptance>::new()
            .columns(&["signer_name", "title"])
            .join::<Agreement>(JoinKind::Left, col("agreement.id").eq(col("agreement_id")))
            .filter(col("title").ne("draft"))
            .serialize()
            .unwrap();
        assert_eq!(
            query.sql_text,
            "SELECT acceptance.signer_name, agreement.title FROM acceptance LEFT JOIN agreement \
             ON agreement.id = acceptance.agreement_id WHERE agreement.title <> :p0"
        );
    }

    #[test]
    fn column_declared_on_two_joined_tables_is_ambiguous() {
        let err = Select::<Acceptance>::new()
            .join::<Agreement>(JoinKind::Inner, col("agreement.id").eq(col("agreement_id")))
            .filter(col("id").eq(1_i64))
            .serialize()
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::AmbiguousColumn {
                column: "id".to_string(),
                first: "acceptance".to_string(),
                second: "agreement".to_string(),
            }
        );
    }

    #[test]
    fn projection_must_name_distinct_result_columns() {
        let err = Select::<Acceptance>::new()
            .columns(&["acceptance.id", "agreement.id"])
            .join::<Agreement>(JoinKind::Inner, col("agreement.id").eq(col("agreement_id")))
            .serialize()
            .unwrap_err();
        assert_eq!(err, QueryError::DuplicateOutputColumn("id".to_string()));
        let err = Select::<Acceptance>::new().columns(&[]).serialize().unwrap_err();
        assert_eq!(err, QueryError::EmptyProjection("Acceptance".to_string()));
    }

    #[test]
    fn unjoined_table_is_unknown() {
        let err = Select::<Acceptance>::new()
            .filter(col("agreement.title").eq("x"))
            .serialize()
            .unwrap_err();
        assert_eq!(err, QueryError::UnknownTable("agreement".to_string()));
    }

    #[test]
    fn update_binds_assignments_before_predicates() {
        let query = Update::<Acceptance>::new()
            .set("signer_name", "bob")
            .filter(col("id").eq(7_i64))
            .serialize()
            .unwrap();
        assert_eq!(query.sql_text, "UPDATE acceptance SET signer_name = :p0 WHERE id = :p1");
        assert!(query.write_intent());
    }

    #[test]
    fn unbounded_mutations_require_opt_in() {
        let err = Delete::<Acceptance>::new().serialize().unwrap_err();
        assert!(matches!(err, QueryError::UnboundedMutation { .. }));
        let query = Delete::<Acceptance>::new().allow_all_rows().serialize().unwrap();
        assert_eq!(query.sql_text, "DELETE FROM acceptance");
        let err = Update::<Acceptance>::new().set("signer_name", "x").serialize().unwrap_err();
        assert!(matches!(err, QueryError::UnboundedMutation { .. }));
    }

    #[test]
    fn insert_rejects_duplicate_columns() {
        let err = Insert::<Acceptance>::new()
            .value("id", 1_i64)
            .value("id", 2_i64)
            .serialize()
            .unwrap_err();
        assert_eq!(err, QueryError::DuplicateAssignment("id".to_string()));
        let query = Insert::<Acceptance>::new()
            .value("id", 1_i64)
            .value("signer_name", "ann")
            .serialize()
            .unwrap();
        assert_eq!(query.sql_text, "INSERT INTO acceptance (id, signer_name) VALUES (:p0, :p1)");
    }

    #[test]
    fn identifiers_outside_grammar_are_rejected() {
        let err = Select::<Acceptance>::new()
            .order_by("id; DROP TABLE acceptance", Direction::Asc)
            .serialize()
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidIdentifier(_)));
    }
}
