//! Join kinds and the joined-table clause.

use std::cell::OnceCell;

use crate::builder::Source;
use crate::clause::{Operator, WhereClause};
use crate::value::Value;

/// Which rows of the joined table survive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinType {
    pub const fn keyword(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

// =============================================================================
// Join Clause
// =============================================================================

/// How a joined table is linked to the rest of the statement.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    /// No condition (CROSS joins)
    None,
    /// `USING (a, b)`
    Using(Vec<String>),
    /// `ON left <op> right`
    On {
        left: String,
        operator: Operator,
        right: String,
    },
    /// `ON (<nested predicates>)`
    Where(WhereClause),
}

/// One joined table plus its linking condition.
#[derive(Debug, Clone)]
pub struct JoinClause {
    join_type: JoinType,
    source: Source,
    condition: JoinCondition,
    bindings: OnceCell<Vec<Value>>,
}

impl PartialEq for JoinClause {
    fn eq(&self, other: &Self) -> bool {
        self.join_type == other.join_type
            && self.source == other.source
            && self.condition == other.condition
    }
}

impl JoinClause {
    pub fn new(join_type: JoinType, source: Source, condition: JoinCondition) -> Self {
        Self {
            join_type,
            source,
            condition,
            bindings: OnceCell::new(),
        }
    }

    #[inline]
    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    #[inline]
    pub fn source(&self) -> &Source {
        &self.source
    }

    #[inline]
    pub fn condition(&self) -> &JoinCondition {
        &self.condition
    }

    /// Source bindings (derived tables) followed by condition bindings.
    pub fn bindings(&self) -> &[Value] {
        self.bindings.get_or_init(|| {
            let mut out = self.source.bindings();
            if let JoinCondition::Where(clause) = &self.condition {
                out.extend(clause.bindings().iter().cloned());
            }
            out
        })
    }
}
