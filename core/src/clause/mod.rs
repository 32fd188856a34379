//! Predicate clauses: operators, connectors and the clause-kind tagged union.

mod where_clause;

pub use where_clause::WhereClause;

use core::fmt;
use core::str::FromStr;

use crate::builder::Builder;
use crate::error::SluiceError;
use crate::expression::Expression;
use crate::value::Value;

// =============================================================================
// Connector / Operator
// =============================================================================

/// Boolean connector joining a clause to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connector {
    #[default]
    And,
    Or,
}

impl Connector {
    pub const fn as_str(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

impl From<bool> for Connector {
    /// `true` is AND, `false` is OR.
    fn from(and: bool) -> Self {
        if and { Connector::And } else { Connector::Or }
    }
}

impl FromStr for Connector {
    type Err = SluiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => Ok(Connector::And),
            "or" => Ok(Connector::Or),
            other => Err(SluiceError::composition(format!(
                "unknown boolean connector '{other}'"
            ))),
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    In,
    NotIn,
    Is,
    IsNot,
    Glob,
}

impl Operator {
    pub const fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
            Operator::Glob => "GLOB",
        }
    }

    /// Whether the right-hand side is a list.
    pub const fn is_membership(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = SluiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok(match normalized.to_ascii_uppercase().as_str() {
            "=" | "==" => Operator::Eq,
            "<>" | "!=" => Operator::NotEq,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "IS" => Operator::Is,
            "IS NOT" => Operator::IsNot,
            "GLOB" => Operator::Glob,
            _ => {
                return Err(SluiceError::composition(format!(
                    "unknown comparison operator '{s}'"
                )));
            }
        })
    }
}

impl TryFrom<&str> for Operator {
    type Error = SluiceError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// =============================================================================
// Clause kinds
// =============================================================================

/// Tag of a clause, one per predicate shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    Eq,
    ColumnEq,
    Time,
    Unix,
    Null,
    NotNull,
    Exists,
    NotExists,
    Group,
    Raw,
}

/// Right-hand side of a column comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// One bound value
    Value(Value),
    /// A bound list, for `IN` / `NOT IN`
    List(Vec<Value>),
    /// Raw SQL with its own bindings
    Expr(Expression),
    /// A subquery rendered in parentheses
    Query(Box<Builder>),
}

impl Operand {
    fn collect_bindings(&self, out: &mut Vec<Value>) {
        match self {
            Operand::Value(v) => out.push(v.clone()),
            Operand::List(values) => out.extend(values.iter().cloned()),
            Operand::Expr(expr) => out.extend(expr.bindings.iter().cloned()),
            Operand::Query(query) => out.extend(query.get_bindings().iter().cloned()),
        }
    }
}

/// The predicate carried by a clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column <op> operand`
    Compare {
        column: String,
        operator: Operator,
        value: Operand,
    },
    /// `left <op> right`, both columns
    Columns {
        left: String,
        operator: Operator,
        right: String,
    },
    /// `column <op> ?` against a datetime text
    Time {
        column: String,
        operator: Operator,
        value: String,
    },
    /// `column <op> ?` against unix seconds
    Unix {
        column: String,
        operator: Operator,
        value: i64,
    },
    Null(String),
    NotNull(String),
    Exists(Box<Builder>),
    NotExists(Box<Builder>),
    Group(WhereClause),
    Raw(Expression),
}

/// One predicate plus the connector to the previous clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub connector: Connector,
    pub predicate: Predicate,
}

impl Clause {
    pub fn new(connector: Connector, predicate: Predicate) -> Self {
        Self {
            connector,
            predicate,
        }
    }

    pub fn kind(&self) -> ClauseKind {
        match &self.predicate {
            Predicate::Compare { .. } => ClauseKind::Eq,
            Predicate::Columns { .. } => ClauseKind::ColumnEq,
            Predicate::Time { .. } => ClauseKind::Time,
            Predicate::Unix { .. } => ClauseKind::Unix,
            Predicate::Null(_) => ClauseKind::Null,
            Predicate::NotNull(_) => ClauseKind::NotNull,
            Predicate::Exists(_) => ClauseKind::Exists,
            Predicate::NotExists(_) => ClauseKind::NotExists,
            Predicate::Group(_) => ClauseKind::Group,
            Predicate::Raw(_) => ClauseKind::Raw,
        }
    }

    /// Appends this clause's bindings in placeholder order.
    pub fn collect_bindings(&self, out: &mut Vec<Value>) {
        match &self.predicate {
            Predicate::Compare { value, .. } => value.collect_bindings(out),
            Predicate::Time { value, .. } => out.push(Value::Text(value.clone())),
            Predicate::Unix { value, .. } => out.push(Value::Integer(*value)),
            Predicate::Exists(query) | Predicate::NotExists(query) => {
                out.extend(query.get_bindings().iter().cloned())
            }
            Predicate::Group(group) => out.extend(group.bindings().iter().cloned()),
            Predicate::Raw(expr) => out.extend(expr.bindings.iter().cloned()),
            Predicate::Columns { .. } | Predicate::Null(_) | Predicate::NotNull(_) => {}
        }
    }
}
