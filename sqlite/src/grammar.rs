//! SQLite statement compiler.
//!
//! Every renderer appends SQL text and the matching bindings to one
//! [`Writer`], so placeholder order always follows text order.

use sluice_core::builder::{Builder, OrderByClause, Selection, Source};
use sluice_core::clause::{Clause, Operand, Operator, Predicate, WhereClause};
use sluice_core::error::{Result, SluiceError};
use sluice_core::expression::Expression;
use sluice_core::grammar::{Compiled, Grammar};
use sluice_core::join::{JoinClause, JoinCondition};
use sluice_core::value::Value;

/// Default host-parameter limit of SQLite builds before 3.32.
pub const DEFAULT_MAX_BINDINGS: usize = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SQLiteGrammar {
    max_bindings: usize,
}

impl Default for SQLiteGrammar {
    fn default() -> Self {
        Self::new()
    }
}

impl SQLiteGrammar {
    pub const fn new() -> Self {
        Self {
            max_bindings: DEFAULT_MAX_BINDINGS,
        }
    }

    pub const fn with_max_bindings(mut self, max_bindings: usize) -> Self {
        self.max_bindings = max_bindings;
        self
    }
}

// =============================================================================
// Identifier quoting
// =============================================================================

fn quote(identifier: &str) -> String {
    if identifier == "*" {
        return identifier.to_string();
    }
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quotes a column reference. `table.column` quotes each part and
/// `column AS alias` quotes both sides; anything that looks like an
/// expression is passed through untouched.
pub fn wrap(reference: &str) -> String {
    let trimmed = reference.trim();
    if trimmed.contains('(') || trimmed.contains('"') || trimmed.contains('?') {
        return trimmed.to_string();
    }
    if let Some(index) = trimmed.to_ascii_lowercase().find(" as ") {
        let (column, alias) = (&trimmed[..index], &trimmed[index + 4..]);
        return format!("{} AS {}", wrap(column), quote(alias.trim()));
    }
    if trimmed.contains(' ') {
        return trimmed.to_string();
    }
    trimmed.split('.').map(quote).collect::<Vec<_>>().join(".")
}

/// The bare column name of a possibly qualified reference.
fn unqualified(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

// =============================================================================
// Writer
// =============================================================================

#[derive(Default)]
struct Writer {
    sql: String,
    bindings: Vec<Value>,
}

impl Writer {
    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, value: &Value) {
        self.sql.push('?');
        self.bindings.push(value.clone());
    }

    fn expression(&mut self, expr: &Expression) {
        self.push(expr.text());
        self.bindings.extend(expr.bindings().iter().cloned());
        if let Some(alias) = &expr.alias {
            self.push(" AS ");
            self.push(&quote(alias));
        }
    }

    fn finish(self) -> Compiled {
        Compiled::new(self.sql, self.bindings)
    }
}

// =============================================================================
// SELECT
// =============================================================================

impl SQLiteGrammar {
    fn select_into(&self, out: &mut Writer, query: &Builder) -> Result<()> {
        if query.get_unions().is_empty() {
            return self.select_body(out, query);
        }

        self.union_member(out, query)?;
        for union in query.get_unions() {
            out.push(if union.all { " UNION ALL " } else { " UNION " });
            self.union_member(out, &union.query)?;
        }
        self.orders(out, query.get_union_orders());
        self.paging(out, query.get_union_limit(), query.get_union_offset());
        Ok(())
    }

    /// Compound members cannot carry their own ORDER BY or LIMIT in SQLite,
    /// so such members are wrapped in a derived table.
    fn union_member(&self, out: &mut Writer, query: &Builder) -> Result<()> {
        let paged = !query.get_orders().is_empty()
            || query.get_limit().is_some()
            || query.get_offset().is_some();
        if paged {
            out.push("SELECT * FROM (");
            self.select_body(out, query)?;
            out.push(")");
        } else {
            self.select_body(out, query)?;
        }
        Ok(())
    }

    fn select_body(&self, out: &mut Writer, query: &Builder) -> Result<()> {
        out.push("SELECT ");
        if let Some((function, column)) = query.get_aggregate() {
            out.push(function.as_str());
            out.push("(");
            if query.is_distinct() && column != "*" {
                out.push("DISTINCT ");
            }
            out.push(&wrap(column));
            out.push(") AS ");
            out.push(&quote("aggregate"));
        } else {
            if query.is_distinct() {
                out.push("DISTINCT ");
            }
            self.columns(out, query.get_columns());
        }

        if let Some(source) = query.get_from() {
            out.push(" FROM ");
            self.source(out, source)?;
        }
        for join in query.get_joins() {
            self.join(out, join)?;
        }
        self.wheres(out, " WHERE ", query.get_wheres())?;
        if !query.get_groups().is_empty() {
            out.push(" GROUP BY ");
            let groups: Vec<String> = query.get_groups().iter().map(|g| wrap(g)).collect();
            out.push(&groups.join(", "));
        }
        self.wheres(out, " HAVING ", query.get_havings())?;
        self.orders(out, query.get_orders());
        self.paging(out, query.get_limit(), query.get_offset());
        // SQLite locks the whole database; row lock requests are dropped.
        Ok(())
    }

    fn columns(&self, out: &mut Writer, columns: &[Selection]) {
        if columns.is_empty() {
            out.push("*");
            return;
        }
        for (index, selection) in columns.iter().enumerate() {
            if index > 0 {
                out.push(", ");
            }
            match selection {
                Selection::Column(column) => out.push(&wrap(column)),
                Selection::Expr(expr) => out.expression(expr),
            }
        }
    }

    fn source(&self, out: &mut Writer, source: &Source) -> Result<()> {
        match source {
            Source::Table { name, alias } => {
                out.push(&quote(name));
                if let Some(alias) = alias {
                    out.push(" AS ");
                    out.push(&quote(alias));
                }
            }
            Source::Query { query, alias } => {
                out.push("(");
                self.select_into(out, query)?;
                out.push(") AS ");
                out.push(&quote(alias));
            }
            Source::Raw(expr) => out.expression(expr),
        }
        Ok(())
    }

    fn join(&self, out: &mut Writer, join: &JoinClause) -> Result<()> {
        out.push(" ");
        out.push(join.join_type().keyword());
        out.push(" ");
        self.source(out, join.source())?;
        match join.condition() {
            JoinCondition::None => {}
            JoinCondition::Using(columns) => {
                let columns: Vec<String> = columns.iter().map(|c| quote(c)).collect();
                out.push(" USING (");
                out.push(&columns.join(", "));
                out.push(")");
            }
            JoinCondition::On {
                left,
                operator,
                right,
            } => {
                out.push(" ON ");
                out.push(&format!("{} {} {}", wrap(left), operator, wrap(right)));
            }
            JoinCondition::Where(clause) => self.wheres(out, " ON ", clause)?,
        }
        Ok(())
    }

    fn orders(&self, out: &mut Writer, orders: &[OrderByClause]) {
        if orders.is_empty() {
            return;
        }
        let terms: Vec<String> = orders
            .iter()
            .map(|order| match order {
                OrderByClause::Column { column, direction } => {
                    format!("{} {}", wrap(column), direction.as_str())
                }
                OrderByClause::Raw(text) => text.clone(),
            })
            .collect();
        out.push(" ORDER BY ");
        out.push(&terms.join(", "));
    }

    fn paging(&self, out: &mut Writer, limit: Option<u64>, offset: Option<u64>) {
        match (limit, offset) {
            (Some(limit), Some(offset)) => out.push(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => out.push(&format!(" LIMIT {limit}")),
            // OFFSET requires a LIMIT in SQLite
            (None, Some(offset)) => out.push(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
    }

    // ==================== predicates ====================

    fn wheres(&self, out: &mut Writer, keyword: &str, clause: &WhereClause) -> Result<()> {
        if clause.is_empty() {
            return Ok(());
        }
        out.push(keyword);
        self.clauses(out, clause.clauses())
    }

    fn clauses(&self, out: &mut Writer, clauses: &[Clause]) -> Result<()> {
        let mut first = true;
        for clause in clauses {
            if matches!(&clause.predicate, Predicate::Group(group) if group.is_empty()) {
                continue;
            }
            if !first {
                out.push(" ");
                out.push(clause.connector.as_str());
                out.push(" ");
            }
            first = false;
            self.predicate(out, &clause.predicate)?;
        }
        Ok(())
    }

    fn predicate(&self, out: &mut Writer, predicate: &Predicate) -> Result<()> {
        match predicate {
            Predicate::Compare {
                column,
                operator,
                value,
            } => self.compare(out, column, *operator, value)?,
            Predicate::Columns {
                left,
                operator,
                right,
            } => out.push(&format!("{} {} {}", wrap(left), operator, wrap(right))),
            Predicate::Time {
                column,
                operator,
                value,
            } => {
                out.push(&format!("datetime({}) {} datetime(", wrap(column), operator));
                out.bind(&Value::Text(value.clone()));
                out.push(")");
            }
            Predicate::Unix {
                column,
                operator,
                value,
            } => {
                out.push(&format!("{} {} ", wrap(column), operator));
                out.bind(&Value::Integer(*value));
            }
            Predicate::Null(column) => out.push(&format!("{} IS NULL", wrap(column))),
            Predicate::NotNull(column) => out.push(&format!("{} IS NOT NULL", wrap(column))),
            Predicate::Exists(query) => {
                out.push("EXISTS (");
                self.select_into(out, query)?;
                out.push(")");
            }
            Predicate::NotExists(query) => {
                out.push("NOT EXISTS (");
                self.select_into(out, query)?;
                out.push(")");
            }
            Predicate::Group(group) => {
                out.push("(");
                self.clauses(out, group.clauses())?;
                out.push(")");
            }
            Predicate::Raw(expr) => out.expression(expr),
        }
        Ok(())
    }

    fn compare(
        &self,
        out: &mut Writer,
        column: &str,
        operator: Operator,
        value: &Operand,
    ) -> Result<()> {
        let column = wrap(column);
        match value {
            Operand::List(values) if values.is_empty() => {
                // Nothing is a member of an empty list.
                out.push(match operator {
                    Operator::NotIn => "1 = 1",
                    _ => "0 = 1",
                });
            }
            Operand::List(values) => {
                out.push(&format!("{column} {operator} ("));
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        out.push(", ");
                    }
                    out.bind(value);
                }
                out.push(")");
            }
            Operand::Value(value) => {
                out.push(&format!("{column} {operator} "));
                out.bind(value);
            }
            Operand::Expr(expr) => {
                out.push(&format!("{column} {operator} "));
                out.push(expr.text());
                out.bindings.extend(expr.bindings().iter().cloned());
            }
            Operand::Query(query) => {
                out.push(&format!("{column} {operator} ("));
                self.select_into(out, query)?;
                out.push(")");
            }
        }
        Ok(())
    }

    fn target_table<'q>(&self, query: &'q Builder, statement: &str) -> Result<&'q str> {
        query.get_table().ok_or_else(|| {
            SluiceError::composition(format!("{statement} requires a table source"))
        })
    }

    fn reject_joins_and_paging(&self, query: &Builder, statement: &str) -> Result<()> {
        if !query.get_joins().is_empty() {
            return Err(SluiceError::composition(format!(
                "SQLite does not support {statement} with joins"
            )));
        }
        if query.get_limit().is_some() || query.get_offset().is_some() {
            return Err(SluiceError::composition(format!(
                "SQLite does not support {statement} with LIMIT/OFFSET"
            )));
        }
        Ok(())
    }

    fn target(&self, out: &mut Writer, query: &Builder, statement: &str) -> Result<()> {
        let table = self.target_table(query, statement)?;
        out.push(&quote(table));
        if let Some(Source::Table {
            alias: Some(alias), ..
        }) = query.get_from()
        {
            out.push(" AS ");
            out.push(&quote(alias));
        }
        Ok(())
    }
}

impl Grammar for SQLiteGrammar {
    fn compile_select(&self, query: &Builder) -> Result<Compiled> {
        let mut out = Writer::default();
        self.select_into(&mut out, query)?;
        Ok(out.finish())
    }

    fn compile_exists(&self, query: &Builder) -> Result<Compiled> {
        let mut out = Writer::default();
        out.push("SELECT EXISTS(");
        self.select_into(&mut out, query)?;
        out.push(") AS ");
        out.push(&quote("exists"));
        Ok(out.finish())
    }

    fn compile_insert(
        &self,
        query: &Builder,
        columns: &[&str],
        rows: &[Vec<Value>],
        replace: bool,
    ) -> Result<Compiled> {
        let table = self.target_table(query, "INSERT")?;
        let verb = if replace {
            "INSERT OR REPLACE INTO"
        } else {
            "INSERT INTO"
        };
        let mut out = Writer::default();
        out.push(&format!("{verb} {}", quote(table)));

        if columns.is_empty() {
            if rows.len() > 1 {
                return Err(SluiceError::composition(
                    "DEFAULT VALUES inserts exactly one row per statement",
                ));
            }
            out.push(" DEFAULT VALUES");
            return Ok(out.finish());
        }
        if rows.is_empty() {
            return Err(SluiceError::composition("INSERT requires at least one row"));
        }

        let names: Vec<String> = columns.iter().map(|c| quote(unqualified(c))).collect();
        out.push(&format!(" ({}) VALUES ", names.join(", ")));
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(SluiceError::composition(format!(
                    "insert row {index} has {} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            if index > 0 {
                out.push(", ");
            }
            out.push("(");
            for (position, value) in row.iter().enumerate() {
                if position > 0 {
                    out.push(", ");
                }
                out.bind(value);
            }
            out.push(")");
        }
        Ok(out.finish())
    }

    fn compile_insert_from(
        &self,
        query: &Builder,
        columns: &[&str],
        select: &Builder,
    ) -> Result<Compiled> {
        let table = self.target_table(query, "INSERT")?;
        let mut out = Writer::default();
        out.push(&format!("INSERT INTO {}", quote(table)));
        if !columns.is_empty() {
            let names: Vec<String> = columns.iter().map(|c| quote(unqualified(c))).collect();
            out.push(&format!(" ({})", names.join(", ")));
        }
        out.push(" ");
        self.select_into(&mut out, select)?;
        Ok(out.finish())
    }

    fn compile_update(
        &self,
        query: &Builder,
        sets: &[(String, Expression)],
    ) -> Result<Option<Compiled>> {
        if sets.is_empty() {
            return Ok(None);
        }
        self.reject_joins_and_paging(query, "UPDATE")?;
        let mut out = Writer::default();
        out.push("UPDATE ");
        self.target(&mut out, query, "UPDATE")?;
        out.push(" SET ");
        for (index, (column, expr)) in sets.iter().enumerate() {
            if index > 0 {
                out.push(", ");
            }
            out.push(&quote(unqualified(column)));
            out.push(" = ");
            out.push(expr.text());
            out.bindings.extend(expr.bindings().iter().cloned());
        }
        self.wheres(&mut out, " WHERE ", query.get_wheres())?;
        Ok(Some(out.finish()))
    }

    fn compile_delete(&self, query: &Builder) -> Result<Compiled> {
        self.reject_joins_and_paging(query, "DELETE")?;
        let mut out = Writer::default();
        out.push("DELETE FROM ");
        self.target(&mut out, query, "DELETE")?;
        self.wheres(&mut out, " WHERE ", query.get_wheres())?;
        Ok(out.finish())
    }

    fn max_bindings(&self) -> Option<usize> {
        Some(self.max_bindings)
    }
}
