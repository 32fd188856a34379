//! The statement model.
//!
//! A [`Builder`] accumulates structural state (projection, source, joins,
//! predicates, grouping, ordering, unions, lock flag) without producing any
//! SQL. Text generation is delegated to a [`Grammar`](crate::Grammar) and
//! execution to a [`Connection`](crate::Connection), see `exec.rs`,
//! `insert.rs` and `upsert.rs`.

mod exec;
mod insert;
mod upsert;

pub use insert::InsertResult;

use std::cell::OnceCell;

use compact_str::CompactString;

use crate::clause::{Connector, Operator, WhereClause};
use crate::error::{Result, SluiceError};
use crate::expression::Expression;
use crate::grammar::{Compiled, Grammar};
use crate::join::{JoinClause, JoinCondition, JoinType};
use crate::value::Value;

// =============================================================================
// Statement parts
// =============================================================================

/// One projected column.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// A column name, optionally `name AS alias`
    Column(String),
    /// Raw SQL with bindings and an optional alias
    Expr(Expression),
}

/// The row source of a statement or join.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table { name: String, alias: Option<String> },
    Query { query: Box<Builder>, alias: String },
    Raw(Expression),
}

impl Source {
    pub fn table(name: impl Into<String>) -> Self {
        Source::Table {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Source::Table {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    pub fn query(query: Builder, alias: impl Into<String>) -> Self {
        Source::Query {
            query: Box::new(query),
            alias: alias.into(),
        }
    }

    /// The name other clauses use to refer to this source.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Source::Table { name, alias } => Some(alias.as_deref().unwrap_or(name)),
            Source::Query { alias, .. } => Some(alias),
            Source::Raw(expr) => expr.alias.as_deref(),
        }
    }

    /// Underlying table name, if this is a plain table.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            Source::Table { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn bindings(&self) -> Vec<Value> {
        match self {
            Source::Table { .. } => Vec::new(),
            Source::Query { query, .. } => query.get_bindings().to_vec(),
            Source::Raw(expr) => expr.bindings.clone(),
        }
    }
}

/// Aggregate function applied by `count`/`sum`/`min`/`max`/`avg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFn {
    pub const fn as_str(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
            AggregateFn::Avg => "AVG",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    #[default]
    Asc,
    Desc,
}

impl OrderBy {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderBy::Asc => "ASC",
            OrderBy::Desc => "DESC",
        }
    }
}

/// Represents an ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderByClause {
    Column { column: String, direction: OrderBy },
    Raw(String),
}

/// One UNION branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Union {
    pub query: Builder,
    pub all: bool,
}

/// Row lock requested for a SELECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    ForUpdate,
    Shared,
}

// =============================================================================
// Builder
// =============================================================================

/// A composable SQL statement.
///
/// Cloning is deep: joins, predicates and unions are owned values.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    columns: Vec<Selection>,
    distinct: bool,
    aggregate: Option<(AggregateFn, String)>,
    from: Option<Source>,
    joins: Vec<JoinClause>,
    wheres: WhereClause,
    groups: Vec<String>,
    havings: WhereClause,
    orders: Vec<OrderByClause>,
    limit: Option<u64>,
    offset: Option<u64>,
    unions: Vec<Union>,
    union_orders: Vec<OrderByClause>,
    union_limit: Option<u64>,
    union_offset: Option<u64>,
    lock: Option<Lock>,
    bindings: OnceCell<Vec<Value>>,
}

impl PartialEq for Builder {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
            && self.distinct == other.distinct
            && self.aggregate == other.aggregate
            && self.from == other.from
            && self.joins == other.joins
            && self.wheres == other.wheres
            && self.groups == other.groups
            && self.havings == other.havings
            && self.orders == other.orders
            && self.limit == other.limit
            && self.offset == other.offset
            && self.unions == other.unions
            && self.union_orders == other.union_orders
            && self.union_limit == other.union_limit
            && self.union_offset == other.union_offset
            && self.lock == other.lock
    }
}

/// Forwards predicate methods to the WHERE clause list, clearing the
/// statement's binding cache.
macro_rules! delegate_where {
    ($( $(#[$meta:meta])* $name:ident ( $($arg:ident : $ty:ty),* ); )*) => { $(
        $(#[$meta])*
        pub fn $name(&mut self, $($arg: $ty),*) -> &mut Self {
            self.wheres_mut().$name($($arg),*);
            self
        }
    )* };
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SELECT * FROM <table>`
    pub fn table(name: impl Into<String>) -> Self {
        let mut builder = Self::new();
        builder.from(name);
        builder
    }

    fn touch(&mut self) {
        self.bindings.take();
    }

    /// The WHERE clause list, for direct composition.
    pub fn wheres_mut(&mut self) -> &mut WhereClause {
        self.touch();
        &mut self.wheres
    }

    /// Qualifies bare WHERE/HAVING columns with `table` from now on.
    pub fn prefix(&mut self, table: impl Into<CompactString>) -> &mut Self {
        let table = table.into();
        self.wheres.set_table(Some(table.clone()));
        self.havings.set_table(Some(table));
        self
    }

    // ==================== projection ====================

    /// Replaces the projection.
    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.touch();
        self.columns = columns
            .into_iter()
            .map(|c| Selection::Column(c.into()))
            .collect();
        self
    }

    pub fn add_select(&mut self, column: impl Into<String>) -> &mut Self {
        self.touch();
        self.columns.push(Selection::Column(column.into()));
        self
    }

    pub fn add_select_expr(&mut self, expr: Expression) -> &mut Self {
        self.touch();
        self.columns.push(Selection::Expr(expr));
        self
    }

    /// Replaces the projection with one raw fragment.
    pub fn select_raw(&mut self, text: impl Into<String>) -> &mut Self {
        self.touch();
        self.columns = vec![Selection::Expr(Expression::raw(text))];
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    pub(crate) fn set_aggregate(&mut self, function: AggregateFn, column: impl Into<String>) {
        self.touch();
        self.columns.clear();
        self.aggregate = Some((function, column.into()));
    }

    // ==================== source ====================

    pub fn from(&mut self, table: impl Into<String>) -> &mut Self {
        self.touch();
        self.from = Some(Source::table(table));
        self
    }

    pub fn from_as(&mut self, table: impl Into<String>, alias: impl Into<String>) -> &mut Self {
        self.touch();
        self.from = Some(Source::aliased(table, alias));
        self
    }

    /// `FROM (<query>) AS alias`
    pub fn from_sub(&mut self, query: Builder, alias: impl Into<String>) -> &mut Self {
        self.touch();
        self.from = Some(Source::query(query, alias));
        self
    }

    pub fn from_raw(&mut self, expr: Expression) -> &mut Self {
        self.touch();
        self.from = Some(Source::Raw(expr));
        self
    }

    // ==================== joins ====================

    pub fn join_clause(&mut self, join: JoinClause) -> &mut Self {
        self.touch();
        self.joins.push(join);
        self
    }

    fn join_on(
        &mut self,
        join: JoinType,
        table: &str,
        left: &str,
        operator: Operator,
        right: &str,
    ) -> &mut Self {
        self.join_clause(JoinClause::new(
            join,
            Source::table(table),
            JoinCondition::On {
                left: left.to_string(),
                operator,
                right: right.to_string(),
            },
        ))
    }

    /// `INNER JOIN table ON left <op> right`
    pub fn join(&mut self, table: &str, left: &str, operator: Operator, right: &str) -> &mut Self {
        self.join_on(JoinType::Inner, table, left, operator, right)
    }

    pub fn left_join(
        &mut self,
        table: &str,
        left: &str,
        operator: Operator,
        right: &str,
    ) -> &mut Self {
        self.join_on(JoinType::Left, table, left, operator, right)
    }

    pub fn right_join(
        &mut self,
        table: &str,
        left: &str,
        operator: Operator,
        right: &str,
    ) -> &mut Self {
        self.join_on(JoinType::Right, table, left, operator, right)
    }

    pub fn cross_join(&mut self, table: &str) -> &mut Self {
        self.join_clause(JoinClause::new(
            JoinType::Cross,
            Source::table(table),
            JoinCondition::None,
        ))
    }

    /// `<join> table USING (columns)`
    pub fn join_using<I, S>(&mut self, join: JoinType, table: &str, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        self.join_clause(JoinClause::new(
            join,
            Source::table(table),
            JoinCondition::Using(columns),
        ))
    }

    /// `<join> source ON (<nested predicates>)`
    pub fn join_where<F>(&mut self, join: JoinType, source: Source, f: F) -> &mut Self
    where
        F: FnOnce(&mut WhereClause),
    {
        let mut condition = WhereClause::new();
        f(&mut condition);
        self.join_clause(JoinClause::new(join, source, JoinCondition::Where(condition)))
    }

    // ==================== where ====================

    delegate_where! {
        /// `column = value`
        r#where(column: &str, value: impl Into<Value>);
        or_where(column: &str, value: impl Into<Value>);
        where_op(column: &str, operator: Operator, value: impl Into<Value>);
        or_where_op(column: &str, operator: Operator, value: impl Into<Value>);
        where_op_with(connector: Connector, column: &str, operator: Operator, value: impl Into<Value>);
        where_expr(column: &str, operator: Operator, expr: Expression);
        where_query(column: &str, operator: Operator, query: Builder);
        where_raw(expr: Expression);
        or_where_raw(expr: Expression);
        where_column(left: &str, operator: Operator, right: &str);
        or_where_column(left: &str, operator: Operator, right: &str);
        where_null(column: &str);
        or_where_null(column: &str);
        where_not_null(column: &str);
        or_where_not_null(column: &str);
        where_exists(query: Builder);
        or_where_exists(query: Builder);
        where_not_exists(query: Builder);
        or_where_not_exists(query: Builder);
        where_group(f: impl FnOnce(&mut WhereClause));
        or_where_group(f: impl FnOnce(&mut WhereClause));
        where_in(column: &str, values: impl IntoIterator<Item = impl Into<Value>>);
        or_where_in(column: &str, values: impl IntoIterator<Item = impl Into<Value>>);
        where_not_in(column: &str, values: impl IntoIterator<Item = impl Into<Value>>);
        or_where_not_in(column: &str, values: impl IntoIterator<Item = impl Into<Value>>);
    }

    /// `(a = ? AND b = ?)` from column/value pairs.
    pub fn where_pairs<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.wheres_mut().where_pairs(pairs);
        self
    }

    pub fn or_where_pairs<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.wheres_mut().or_where_pairs(pairs);
        self
    }

    pub fn where_time(
        &mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.wheres_mut().where_time(column, operator, value)?;
        Ok(self)
    }

    pub fn where_unix(
        &mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.wheres_mut().where_unix(column, operator, value)?;
        Ok(self)
    }

    pub fn or_where_time(
        &mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.wheres_mut().or_where_time(column, operator, value)?;
        Ok(self)
    }

    pub fn or_where_unix(
        &mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.wheres_mut().or_where_unix(column, operator, value)?;
        Ok(self)
    }

    /// Composite-key membership, see [`WhereClause::where_in_multi`].
    pub fn where_in_multi<R>(&mut self, columns: &[&str], rows: R) -> Result<&mut Self>
    where
        R: IntoIterator<Item = Vec<Value>>,
    {
        self.wheres_mut().where_in_multi(columns, rows)?;
        Ok(self)
    }

    pub fn where_not_in_multi<R>(&mut self, columns: &[&str], rows: R) -> Result<&mut Self>
    where
        R: IntoIterator<Item = Vec<Value>>,
    {
        self.wheres_mut().where_not_in_multi(columns, rows)?;
        Ok(self)
    }

    // ==================== grouping ====================

    pub fn group_by<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn having(&mut self, column: &str, operator: Operator, value: impl Into<Value>) -> &mut Self {
        self.touch();
        self.havings.where_op(column, operator, value);
        self
    }

    pub fn or_having(
        &mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.touch();
        self.havings.or_where_op(column, operator, value);
        self
    }

    pub fn having_raw(&mut self, expr: Expression) -> &mut Self {
        self.touch();
        self.havings.where_raw(expr);
        self
    }

    // ==================== ordering / paging ====================

    pub fn order_by(&mut self, column: impl Into<String>, direction: OrderBy) -> &mut Self {
        self.orders.push(OrderByClause::Column {
            column: column.into(),
            direction,
        });
        self
    }

    /// Raw ORDER BY term; ORDER BY carries no bindings.
    pub fn order_by_raw(&mut self, expr: impl Into<Expression>) -> Result<&mut Self> {
        let expr = expr.into();
        if expr.has_bindings() {
            return Err(SluiceError::composition(
                "ORDER BY expressions cannot carry bindings",
            ));
        }
        self.orders.push(OrderByClause::Raw(expr.text().to_string()));
        Ok(self)
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Drops ORDER BY, LIMIT and OFFSET.
    pub fn clear_paging(&mut self) -> &mut Self {
        self.orders.clear();
        self.limit = None;
        self.offset = None;
        self
    }

    // ==================== unions ====================

    pub fn union(&mut self, query: Builder) -> &mut Self {
        self.touch();
        self.unions.push(Union { query, all: false });
        self
    }

    pub fn union_all(&mut self, query: Builder) -> &mut Self {
        self.touch();
        self.unions.push(Union { query, all: true });
        self
    }

    /// ORDER BY applied to the whole union.
    pub fn union_order_by(&mut self, column: impl Into<String>, direction: OrderBy) -> &mut Self {
        self.union_orders.push(OrderByClause::Column {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn union_limit(&mut self, limit: u64) -> &mut Self {
        self.union_limit = Some(limit);
        self
    }

    pub fn union_offset(&mut self, offset: u64) -> &mut Self {
        self.union_offset = Some(offset);
        self
    }

    // ==================== locking ====================

    pub fn lock_for_update(&mut self) -> &mut Self {
        self.lock = Some(Lock::ForUpdate);
        self
    }

    pub fn shared_lock(&mut self) -> &mut Self {
        self.lock = Some(Lock::Shared);
        self
    }

    // ==================== accessors ====================

    pub fn get_columns(&self) -> &[Selection] {
        &self.columns
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn get_aggregate(&self) -> Option<(AggregateFn, &str)> {
        self.aggregate.as_ref().map(|(f, c)| (*f, c.as_str()))
    }

    pub fn get_from(&self) -> Option<&Source> {
        self.from.as_ref()
    }

    /// Table name of a plain-table source.
    pub fn get_table(&self) -> Option<&str> {
        self.from.as_ref().and_then(Source::table_name)
    }

    pub fn get_joins(&self) -> &[JoinClause] {
        &self.joins
    }

    pub fn get_wheres(&self) -> &WhereClause {
        &self.wheres
    }

    pub fn get_groups(&self) -> &[String] {
        &self.groups
    }

    pub fn get_havings(&self) -> &WhereClause {
        &self.havings
    }

    pub fn get_orders(&self) -> &[OrderByClause] {
        &self.orders
    }

    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn get_offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn get_unions(&self) -> &[Union] {
        &self.unions
    }

    pub fn get_union_orders(&self) -> &[OrderByClause] {
        &self.union_orders
    }

    pub fn get_union_limit(&self) -> Option<u64> {
        self.union_limit
    }

    pub fn get_union_offset(&self) -> Option<u64> {
        self.union_offset
    }

    pub fn get_lock(&self) -> Option<Lock> {
        self.lock
    }

    /// Whether a plain `COUNT(*)` over this statement would be wrong and it
    /// must be wrapped in a derived table first.
    pub fn needs_wrapping(&self) -> bool {
        self.distinct || !self.groups.is_empty() || !self.unions.is_empty()
    }

    /// Every binding in placeholder order: selects, from, joins, where,
    /// having, then each union branch.
    pub fn get_bindings(&self) -> &[Value] {
        self.bindings.get_or_init(|| {
            let mut out = Vec::new();
            for column in &self.columns {
                if let Selection::Expr(expr) = column {
                    out.extend(expr.bindings.iter().cloned());
                }
            }
            if let Some(from) = &self.from {
                out.extend(from.bindings());
            }
            for join in &self.joins {
                out.extend(join.bindings().iter().cloned());
            }
            out.extend(self.wheres.bindings().iter().cloned());
            out.extend(self.havings.bindings().iter().cloned());
            for union in &self.unions {
                out.extend(union.query.get_bindings().iter().cloned());
            }
            out
        })
    }

    /// Compiles this statement as a SELECT.
    pub fn query(&self, grammar: &dyn Grammar) -> Result<Compiled> {
        grammar.compile_select(self)
    }
}
