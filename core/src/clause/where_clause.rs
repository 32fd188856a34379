use std::cell::OnceCell;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use compact_str::CompactString;

use super::{Clause, Connector, Operand, Operator, Predicate};
use crate::builder::Builder;
use crate::error::{Result, SluiceError};
use crate::expression::Expression;
use crate::value::Value;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Alias of the derived table used by multi-column membership tests.
pub(crate) const MEMBERSHIP_ALIAS: &str = "membership";

/// Ordered, appendable list of predicate clauses.
///
/// Bare column names are qualified with the owning table (if any) when a
/// clause is appended. The binding cache is cleared by every append and
/// rebuilt on the next read.
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    clauses: Vec<Clause>,
    table: Option<CompactString>,
    bindings: OnceCell<Vec<Value>>,
}

impl PartialEq for WhereClause {
    fn eq(&self, other: &Self) -> bool {
        self.clauses == other.clauses && self.table == other.table
    }
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clause list whose bare columns are qualified with `table`.
    pub fn for_table(table: impl Into<CompactString>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::default()
        }
    }

    pub fn set_table(&mut self, table: Option<CompactString>) {
        self.table = table;
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Prefixes a bare column with the owning table.
    pub fn qualify(&self, column: &str) -> String {
        match &self.table {
            Some(table) if !column.contains('.') => format!("{table}.{column}"),
            _ => column.to_string(),
        }
    }

    /// Bindings of every clause, in placeholder order.
    pub fn bindings(&self) -> &[Value] {
        self.bindings.get_or_init(|| {
            let mut out = Vec::new();
            for clause in &self.clauses {
                clause.collect_bindings(&mut out);
            }
            out
        })
    }

    /// Appends a clause.
    pub fn push(&mut self, connector: Connector, predicate: Predicate) -> &mut Self {
        self.bindings.take();
        self.clauses.push(Clause::new(connector, predicate));
        self
    }

    /// Appends every clause of `other`, the first one joined by `connector`.
    pub fn extend(&mut self, connector: Connector, other: WhereClause) -> &mut Self {
        if other.is_empty() {
            return self;
        }
        self.push(connector, Predicate::Group(other))
    }

    // ==================== comparisons ====================

    fn compare(
        &mut self,
        connector: Connector,
        column: &str,
        operator: Operator,
        value: Operand,
    ) -> &mut Self {
        let column = self.qualify(column);
        self.push(
            connector,
            Predicate::Compare {
                column,
                operator,
                value,
            },
        )
    }

    /// `column = value`
    pub fn r#where(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.where_op(column, Operator::Eq, value)
    }

    /// `OR column = value`
    pub fn or_where(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.or_where_op(column, Operator::Eq, value)
    }

    /// `column <op> value`; a `NULL` compared with `=`/`<>` becomes `IS`/`IS NOT`.
    pub fn where_op(&mut self, column: &str, operator: Operator, value: impl Into<Value>) -> &mut Self {
        self.where_op_with(Connector::And, column, operator, value)
    }

    pub fn or_where_op(
        &mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.where_op_with(Connector::Or, column, operator, value)
    }

    /// `column <op> value` joined by an explicit connector.
    pub fn where_op_with(
        &mut self,
        connector: Connector,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> &mut Self {
        let value = value.into();
        if value.is_null() {
            match operator {
                Operator::Eq | Operator::Is => {
                    let column = self.qualify(column);
                    return self.push(connector, Predicate::Null(column));
                }
                Operator::NotEq | Operator::IsNot => {
                    let column = self.qualify(column);
                    return self.push(connector, Predicate::NotNull(column));
                }
                _ => {}
            }
        }
        if operator.is_membership() {
            return self.compare(connector, column, operator, Operand::List(vec![value]));
        }
        self.compare(connector, column, operator, Operand::Value(value))
    }

    /// `column <op> <raw expression>`
    pub fn where_expr(&mut self, column: &str, operator: Operator, expr: Expression) -> &mut Self {
        self.compare(Connector::And, column, operator, Operand::Expr(expr))
    }

    /// `column <op> (subquery)`
    pub fn where_query(&mut self, column: &str, operator: Operator, query: Builder) -> &mut Self {
        self.compare(
            Connector::And,
            column,
            operator,
            Operand::Query(Box::new(query)),
        )
    }

    /// Raw predicate.
    pub fn where_raw(&mut self, expr: Expression) -> &mut Self {
        self.push(Connector::And, Predicate::Raw(expr))
    }

    pub fn or_where_raw(&mut self, expr: Expression) -> &mut Self {
        self.push(Connector::Or, Predicate::Raw(expr))
    }

    // ==================== column-to-column ====================

    /// `left <op> right`, both sides columns.
    pub fn where_column(&mut self, left: &str, operator: Operator, right: &str) -> &mut Self {
        self.where_column_with(Connector::And, left, operator, right)
    }

    pub fn or_where_column(&mut self, left: &str, operator: Operator, right: &str) -> &mut Self {
        self.where_column_with(Connector::Or, left, operator, right)
    }

    pub fn where_column_with(
        &mut self,
        connector: Connector,
        left: &str,
        operator: Operator,
        right: &str,
    ) -> &mut Self {
        let left = self.qualify(left);
        let right = self.qualify(right);
        self.push(
            connector,
            Predicate::Columns {
                left,
                operator,
                right,
            },
        )
    }

    // ==================== time ====================

    /// Compares a datetime column; integers are unix seconds and are
    /// rendered as `YYYY-MM-DD HH:MM:SS` (UTC).
    pub fn where_time(
        &mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.time_with(Connector::And, column, operator, value.into())
    }

    pub fn or_where_time(
        &mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.time_with(Connector::Or, column, operator, value.into())
    }

    fn time_with(
        &mut self,
        connector: Connector,
        column: &str,
        operator: Operator,
        value: Value,
    ) -> Result<&mut Self> {
        let value = match value {
            Value::Text(text) => text,
            Value::Integer(secs) => DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.format(DATETIME_FORMAT).to_string())
                .ok_or_else(|| {
                    SluiceError::composition(format!("timestamp {secs} is out of range"))
                })?,
            other => {
                return Err(SluiceError::composition(format!(
                    "where_time expects text or unix seconds, got {other:?}"
                )));
            }
        };
        let column = self.qualify(column);
        Ok(self.push(
            connector,
            Predicate::Time {
                column,
                operator,
                value,
            },
        ))
    }

    /// Compares a column holding unix seconds; text is parsed as a datetime.
    pub fn where_unix(
        &mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.unix_with(Connector::And, column, operator, value.into())
    }

    pub fn or_where_unix(
        &mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.unix_with(Connector::Or, column, operator, value.into())
    }

    fn unix_with(
        &mut self,
        connector: Connector,
        column: &str,
        operator: Operator,
        value: Value,
    ) -> Result<&mut Self> {
        let value = match value {
            Value::Integer(secs) => secs,
            Value::Text(text) => parse_unix(&text)?,
            other => {
                return Err(SluiceError::composition(format!(
                    "where_unix expects unix seconds or datetime text, got {other:?}"
                )));
            }
        };
        let column = self.qualify(column);
        Ok(self.push(
            connector,
            Predicate::Unix {
                column,
                operator,
                value,
            },
        ))
    }

    // ==================== null checks ====================

    pub fn where_null(&mut self, column: &str) -> &mut Self {
        let column = self.qualify(column);
        self.push(Connector::And, Predicate::Null(column))
    }

    pub fn or_where_null(&mut self, column: &str) -> &mut Self {
        let column = self.qualify(column);
        self.push(Connector::Or, Predicate::Null(column))
    }

    pub fn where_not_null(&mut self, column: &str) -> &mut Self {
        let column = self.qualify(column);
        self.push(Connector::And, Predicate::NotNull(column))
    }

    pub fn or_where_not_null(&mut self, column: &str) -> &mut Self {
        let column = self.qualify(column);
        self.push(Connector::Or, Predicate::NotNull(column))
    }

    // ==================== exists ====================

    pub fn where_exists(&mut self, query: Builder) -> &mut Self {
        self.push(Connector::And, Predicate::Exists(Box::new(query)))
    }

    pub fn or_where_exists(&mut self, query: Builder) -> &mut Self {
        self.push(Connector::Or, Predicate::Exists(Box::new(query)))
    }

    pub fn where_not_exists(&mut self, query: Builder) -> &mut Self {
        self.push(Connector::And, Predicate::NotExists(Box::new(query)))
    }

    pub fn or_where_not_exists(&mut self, query: Builder) -> &mut Self {
        self.push(Connector::Or, Predicate::NotExists(Box::new(query)))
    }

    // ==================== groups ====================

    /// Nested group built by `f`; the group inherits the table prefix.
    pub fn where_group<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut WhereClause),
    {
        self.group_with(Connector::And, f)
    }

    pub fn or_where_group<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut WhereClause),
    {
        self.group_with(Connector::Or, f)
    }

    fn group_with<F>(&mut self, connector: Connector, f: F) -> &mut Self
    where
        F: FnOnce(&mut WhereClause),
    {
        let mut group = WhereClause {
            table: self.table.clone(),
            ..WhereClause::default()
        };
        f(&mut group);
        if group.is_empty() {
            return self;
        }
        self.push(connector, Predicate::Group(group))
    }

    /// `[(a, 1), (b, 2)]` as one group of equalities: `(a = ? AND b = ?)`.
    pub fn where_pairs<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.pairs_with(Connector::And, pairs)
    }

    pub fn or_where_pairs<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.pairs_with(Connector::Or, pairs)
    }

    fn pairs_with<I, K, V>(&mut self, connector: Connector, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.group_with(connector, |group| {
            for (column, value) in pairs {
                group.r#where(column.as_ref(), value);
            }
        })
    }

    // ==================== membership ====================

    pub fn where_in<I, V>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.in_with(Connector::And, column, Operator::In, values)
    }

    pub fn or_where_in<I, V>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.in_with(Connector::Or, column, Operator::In, values)
    }

    pub fn where_not_in<I, V>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.in_with(Connector::And, column, Operator::NotIn, values)
    }

    pub fn or_where_not_in<I, V>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.in_with(Connector::Or, column, Operator::NotIn, values)
    }

    fn in_with<I, V>(
        &mut self,
        connector: Connector,
        column: &str,
        operator: Operator,
        values: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.compare(connector, column, operator, Operand::List(values))
    }

    /// Composite-key membership: `(a, b) IN ((1, 2), (3, 4))`.
    ///
    /// Rendered as a correlated `EXISTS` over a derived table of
    /// `SELECT ? AS c0, ? AS c1 UNION ALL ...`, so bindings are the rows in
    /// row-major order.
    pub fn where_in_multi<R>(&mut self, columns: &[&str], rows: R) -> Result<&mut Self>
    where
        R: IntoIterator<Item = Vec<Value>>,
    {
        self.multi_with(Connector::And, false, columns, rows)
    }

    pub fn or_where_in_multi<R>(&mut self, columns: &[&str], rows: R) -> Result<&mut Self>
    where
        R: IntoIterator<Item = Vec<Value>>,
    {
        self.multi_with(Connector::Or, false, columns, rows)
    }

    pub fn where_not_in_multi<R>(&mut self, columns: &[&str], rows: R) -> Result<&mut Self>
    where
        R: IntoIterator<Item = Vec<Value>>,
    {
        self.multi_with(Connector::And, true, columns, rows)
    }

    fn multi_with<R>(
        &mut self,
        connector: Connector,
        negated: bool,
        columns: &[&str],
        rows: R,
    ) -> Result<&mut Self>
    where
        R: IntoIterator<Item = Vec<Value>>,
    {
        if columns.is_empty() {
            return Err(SluiceError::composition(
                "multi-column IN requires at least one column",
            ));
        }
        let mut derived: Option<Builder> = None;
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(SluiceError::composition(format!(
                    "multi-column IN row {index} has {} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            let mut select = Builder::new();
            for (position, value) in row.into_iter().enumerate() {
                select.add_select_expr(Expression::value(value).alias(format!("c{position}")));
            }
            match derived.as_mut() {
                Some(first) => {
                    first.union_all(select);
                }
                None => derived = Some(select),
            }
        }

        let Some(derived) = derived else {
            // Membership in an empty set.
            let text = if negated { "1 = 1" } else { "0 = 1" };
            return Ok(self.push(connector, Predicate::Raw(Expression::raw(text))));
        };

        let mut membership = Builder::new();
        membership.select_raw("1").from_sub(derived, MEMBERSHIP_ALIAS);
        for (position, column) in columns.iter().enumerate() {
            let outer = self.qualify(column);
            membership.where_column(
                &format!("{MEMBERSHIP_ALIAS}.c{position}"),
                Operator::Eq,
                &outer,
            );
        }
        let predicate = if negated {
            Predicate::NotExists(Box::new(membership))
        } else {
            Predicate::Exists(Box::new(membership))
        };
        Ok(self.push(connector, predicate))
    }
}

fn parse_unix(text: &str) -> Result<i64> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<i64>() {
        return Ok(secs);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT) {
        return Ok(dt.and_utc().timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| SluiceError::composition(format!("cannot parse '{text}' as a datetime")))
}
