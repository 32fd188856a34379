use std::cell::{Cell, RefCell};

use sluice::core::{Connection, Grammar, InsertIdMode, Result, Row, RowCursor, Value};
use sluice::sqlite::SQLiteConnection;

/// Records every statement sent to the wrapped connection.
pub struct Counting {
    inner: SQLiteConnection,
    statements: Cell<usize>,
    log: RefCell<Vec<String>>,
}

impl Counting {
    pub fn new(inner: SQLiteConnection) -> Self {
        Self {
            inner,
            statements: Cell::new(0),
            log: RefCell::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &SQLiteConnection {
        &self.inner
    }

    /// Statements run since the last reset.
    pub fn count(&self) -> usize {
        self.statements.get()
    }

    pub fn reset(&self) {
        self.statements.set(0);
        self.log.borrow_mut().clear();
    }

    pub fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn record(&self, sql: &str) {
        self.statements.set(self.statements.get() + 1);
        self.log.borrow_mut().push(sql.to_string());
    }

    /// Runs a scalar query directly, bypassing the counter.
    pub fn scalar(&self, sql: &str) -> Value {
        self.inner
            .fetch_one(sql, &[])
            .expect("scalar query")
            .and_then(|row| row.get_index(0).cloned())
            .unwrap_or_default()
    }
}

impl Connection for Counting {
    fn grammar(&self) -> &dyn Grammar {
        self.inner.grammar()
    }

    fn execute(&self, sql: &str, bindings: &[Value]) -> Result<u64> {
        self.record(sql);
        self.inner.execute(sql, bindings)
    }

    fn fetch_all(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>> {
        self.record(sql);
        self.inner.fetch_all(sql, bindings)
    }

    fn cursor<'c>(&'c self, sql: &str, bindings: &[Value]) -> Result<RowCursor<'c>> {
        self.record(sql);
        self.inner.cursor(sql, bindings)
    }

    fn last_insert_id(&self, column: Option<&str>) -> Result<Value> {
        self.inner.last_insert_id(column)
    }

    fn insert_id_mode(&self) -> InsertIdMode {
        self.inner.insert_id_mode()
    }

    fn transaction(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.inner.transaction(body)
    }
}
