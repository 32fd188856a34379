//! Read, update and delete execution.

use super::{AggregateFn, Builder};
use crate::attributes::Attributes;
use crate::connection::{Connection, RowCursor};
use crate::error::Result;
use crate::expression::Expression;
use crate::fetch::{FetchMode, Fetched, shape};
use crate::row::{FromRow, Row};
use crate::value::Value;

const AGGREGATE_ALIAS: &str = "aggregate";

impl Builder {
    // ==================== reads ====================

    pub fn fetch_all(&self, conn: &dyn Connection) -> Result<Vec<Row>> {
        let compiled = self.query(conn.grammar())?;
        conn.fetch_all(&compiled.sql, &compiled.bindings)
    }

    pub fn fetch_one(&self, conn: &dyn Connection) -> Result<Option<Row>> {
        let compiled = self.query(conn.grammar())?;
        conn.fetch_one(&compiled.sql, &compiled.bindings)
    }

    /// First row, fetched with `LIMIT 1`.
    pub fn first(&self, conn: &dyn Connection) -> Result<Option<Row>> {
        let mut query = self.clone();
        query.limit(1);
        query.fetch_one(conn)
    }

    pub fn cursor<'c>(&self, conn: &'c dyn Connection) -> Result<RowCursor<'c>> {
        let compiled = self.query(conn.grammar())?;
        conn.cursor(&compiled.sql, &compiled.bindings)
    }

    pub fn fetch_as(&self, conn: &dyn Connection, mode: FetchMode) -> Result<Fetched> {
        shape(self.fetch_all(conn)?, mode)
    }

    pub fn fetch_typed<T: FromRow>(&self, conn: &dyn Connection) -> Result<Vec<T>> {
        self.fetch_all(conn)?.iter().map(T::from_row).collect()
    }

    /// Rows passed through a transform callback.
    pub fn fetch_map<T, F>(&self, conn: &dyn Connection, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row) -> Result<T>,
    {
        self.fetch_all(conn)?.iter().map(|row| f(row)).collect()
    }

    /// Values of one column.
    pub fn pluck(&self, conn: &dyn Connection, column: &str) -> Result<Vec<Value>> {
        let mut query = self.clone();
        query.select([column]);
        let fetched = query.fetch_as(conn, FetchMode::Column(0))?;
        Ok(fetched.into_column().unwrap_or_default())
    }

    pub fn exists(&self, conn: &dyn Connection) -> Result<bool> {
        let compiled = conn.grammar().compile_exists(self)?;
        let row = conn.fetch_one(&compiled.sql, &compiled.bindings)?;
        Ok(row
            .and_then(|row| row.get_index(0).and_then(Value::as_bool))
            .unwrap_or(false))
    }

    // ==================== aggregates ====================

    /// Runs `function(column)` over this statement.
    ///
    /// Grouped, distinct and unioned statements are wrapped in a derived
    /// table so the aggregate sees their result rows.
    pub fn aggregate(
        &self,
        conn: &dyn Connection,
        function: AggregateFn,
        column: &str,
    ) -> Result<Value> {
        let query = if self.needs_wrapping() {
            let mut inner = self.clone();
            inner.clear_paging();
            let mut outer = Builder::new();
            outer.from_sub(inner, AGGREGATE_ALIAS);
            outer.set_aggregate(function, column);
            outer
        } else {
            let mut query = self.clone();
            query.clear_paging();
            query.set_aggregate(function, column);
            query
        };
        Ok(query
            .fetch_one(conn)?
            .and_then(|row| row.get_index(0).cloned())
            .unwrap_or_default())
    }

    pub fn count(&self, conn: &dyn Connection) -> Result<u64> {
        let value = self.aggregate(conn, AggregateFn::Count, "*")?;
        Ok(value.as_i64().unwrap_or(0).max(0) as u64)
    }

    pub fn sum(&self, conn: &dyn Connection, column: &str) -> Result<Value> {
        self.aggregate(conn, AggregateFn::Sum, column)
    }

    pub fn min(&self, conn: &dyn Connection, column: &str) -> Result<Value> {
        self.aggregate(conn, AggregateFn::Min, column)
    }

    pub fn max(&self, conn: &dyn Connection, column: &str) -> Result<Value> {
        self.aggregate(conn, AggregateFn::Max, column)
    }

    pub fn avg(&self, conn: &dyn Connection, column: &str) -> Result<Value> {
        self.aggregate(conn, AggregateFn::Avg, column)
    }

    // ==================== update / delete ====================

    /// Updates every matching row with `data`.
    ///
    /// Returns `None` when `data` is empty: no statement is produced.
    pub fn update(&self, conn: &dyn Connection, data: &Attributes) -> Result<Option<u64>> {
        let sets: Vec<(String, Expression)> = data
            .iter()
            .map(|(column, value)| (column.to_string(), Expression::value(value.clone())))
            .collect();
        self.update_with(conn, &sets)
    }

    /// Updates with raw right-hand sides, e.g. `("hits", "hits + 1")`.
    pub fn update_with(
        &self,
        conn: &dyn Connection,
        sets: &[(String, Expression)],
    ) -> Result<Option<u64>> {
        match conn.grammar().compile_update(self, sets)? {
            Some(compiled) => conn.execute(&compiled.sql, &compiled.bindings).map(Some),
            None => Ok(None),
        }
    }

    pub fn delete(&self, conn: &dyn Connection) -> Result<u64> {
        let compiled = conn.grammar().compile_delete(self)?;
        conn.execute(&compiled.sql, &compiled.bindings)
    }
}
