// crates/query-relay-core/src/query/expr.rs
// ============================================================================
// Module: Query Expressions
// Description: Operands, predicates, and the fluent builders that compose them.
// Purpose: Describe filters and join conditions without writing SQL text.
// Dependencies: crate::scalar
// ============================================================================

//! ## Overview
//! Expressions are plain data. Nothing here renders SQL or validates names;
//! the serializer does both so that every failure surfaces in one place.
//!
//! ```
//! use query_relay_core::query::col;
//!
//! let filter = col("agreement_id").eq("X").and(col("revoked_at").is_null());
//! assert_eq!(filter.columns().len(), 2);
//! ```

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::scalar::ScalarValue;

// ============================================================================
// SECTION: Operands
// ============================================================================

/// Column reference, optionally qualified by table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Qualifying table, when written as `table.column`.
    pub table: Option<String>,
    /// Column name.
    pub name: String,
}

impl ColumnRef {
    /// Parses `column` or `table.column`.
    #[must_use]
    pub fn parse(reference: &str) -> Self {
        match reference.split_once('.') {
            Some((table, name)) => Self {
                table: Some(table.to_string()),
                name: name.to_string(),
            },
            None => Self {
                table: None,
                name: reference.to_string(),
            },
        }
    }
}

/// Value-producing expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Column value.
    Column(ColumnRef),
    /// Bound literal.
    Literal(ScalarValue),
    /// Scalar function call.
    Function {
        /// Function name as written by the caller.
        name: String,
        /// Arguments.
        args: Vec<Operand>,
    },
    /// Window function call; never serializable.
    Window {
        /// Function name as written by the caller.
        name: String,
        /// Partition columns.
        partition_by: Vec<ColumnRef>,
    },
}

/// Starts an expression from a column reference.
#[must_use]
pub fn col(reference: &str) -> Operand {
    Operand::Column(ColumnRef::parse(reference))
}

/// Starts an expression from a literal.
#[must_use]
pub fn lit(value: impl Into<ScalarValue>) -> Operand {
    Operand::Literal(value.into())
}

/// Starts an expression from a scalar function call.
#[must_use]
pub fn func(name: &str, args: impl IntoIterator<Item = Operand>) -> Operand {
    Operand::Function {
        name: name.to_string(),
        args: args.into_iter().collect(),
    }
}

impl From<ScalarValue> for Operand {
    fn from(value: ScalarValue) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Self::Literal(value.into())
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Self::Literal(value.into())
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Self::Literal(value.into())
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Self::Literal(value.into())
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for Operand {
    fn from(value: Option<T>) -> Self {
        Self::Literal(value.map_or(ScalarValue::Null, Into::into))
    }
}

impl Operand {
    /// Turns a function call into a window function over `partition_by`.
    #[must_use]
    pub fn over(self, partition_by: &[&str]) -> Self {
        let name = match self {
            Self::Function {
                name, ..
            }
            | Self::Window {
                name, ..
            } => name,
            Self::Column(column) => column.name,
            Self::Literal(_) => String::from("literal"),
        };
        Self::Window {
            name,
            partition_by: partition_by.iter().map(|column| ColumnRef::parse(column)).collect(),
        }
    }

    /// `self = right`.
    #[must_use]
    pub fn eq(self, right: impl Into<Self>) -> Predicate {
        self.compare(CompareOp::Eq, right)
    }

    /// `self <> right`.
    #[must_use]
    pub fn ne(self, right: impl Into<Self>) -> Predicate {
        self.compare(CompareOp::Ne, right)
    }

    /// `self < right`.
    #[must_use]
    pub fn lt(self, right: impl Into<Self>) -> Predicate {
        self.compare(CompareOp::Lt, right)
    }

    /// `self <= right`.
    #[must_use]
    pub fn le(self, right: impl Into<Self>) -> Predicate {
        self.compare(CompareOp::Le, right)
    }

    /// `self > right`.
    #[must_use]
    pub fn gt(self, right: impl Into<Self>) -> Predicate {
        self.compare(CompareOp::Gt, right)
    }

    /// `self >= right`.
    #[must_use]
    pub fn ge(self, right: impl Into<Self>) -> Predicate {
        self.compare(CompareOp::Ge, right)
    }

    /// `self LIKE pattern`.
    #[must_use]
    pub fn like(self, pattern: impl Into<Self>) -> Predicate {
        self.compare(CompareOp::Like, pattern)
    }

    /// `self IS NULL`.
    #[must_use]
    pub fn is_null(self) -> Predicate {
        Predicate::IsNull {
            operand: self,
            negated: false,
        }
    }

    /// `self IS NOT NULL`.
    #[must_use]
    pub fn is_not_null(self) -> Predicate {
        Predicate::IsNull {
            operand: self,
            negated: true,
        }
    }

    /// `self IN (values...)`.
    #[must_use]
    pub fn is_in<V: Into<ScalarValue>>(self, values: impl IntoIterator<Item = V>) -> Predicate {
        Predicate::In {
            operand: self,
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// `self NOT IN (values...)`.
    #[must_use]
    pub fn not_in<V: Into<ScalarValue>>(self, values: impl IntoIterator<Item = V>) -> Predicate {
        Predicate::In {
            operand: self,
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// Builds a binary comparison.
    fn compare(self, op: CompareOp, right: impl Into<Self>) -> Predicate {
        Predicate::Compare {
            left: self,
            op,
            right: right.into(),
        }
    }

    /// Collects column references reachable from this operand.
    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Self::Column(column) => out.push(column),
            Self::Literal(_) => {}
            Self::Function {
                args, ..
            } => args.iter().for_each(|arg| arg.collect_columns(out)),
            Self::Window {
                partition_by, ..
            } => out.extend(partition_by.iter()),
        }
    }
}

// ============================================================================
// SECTION: Predicates
// ============================================================================

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `LIKE`
    Like,
}

impl CompareOp {
    /// Returns the SQL operator token.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
        }
    }
}

/// Boolean filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Binary comparison.
    Compare {
        /// Left operand.
        left: Operand,
        /// Operator.
        op: CompareOp,
        /// Right operand.
        right: Operand,
    },
    /// Membership test; expands to one parameter per element.
    In {
        /// Tested operand.
        operand: Operand,
        /// Candidate values.
        values: Vec<ScalarValue>,
        /// `NOT IN` when true.
        negated: bool,
    },
    /// Null test; never binds a parameter.
    IsNull {
        /// Tested operand.
        operand: Operand,
        /// `IS NOT NULL` when true.
        negated: bool,
    },
    /// Conjunction.
    And(Vec<Predicate>),
    /// Disjunction.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Conjoins two predicates, flattening nested conjunctions.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut items) => {
                items.push(other);
                Self::And(items)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Disjoins two predicates, flattening nested disjunctions.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut items) => {
                items.push(other);
                Self::Or(items)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Negates the predicate.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Returns every column reference in traversal order.
    #[must_use]
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    /// Collects column references recursively.
    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Self::Compare {
                left,
                right,
                ..
            } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Self::In {
                operand, ..
            }
            | Self::IsNull {
                operand, ..
            } => operand.collect_columns(out),
            Self::And(items) | Self::Or(items) => {
                items.iter().for_each(|item| item.collect_columns(out));
            }
            Self::Not(inner) => inner.collect_columns(out),
        }
    }
}

// ============================================================================
// SECTION: Ordering
// ============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}
