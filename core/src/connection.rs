//! Statement execution contract.

use std::fmt;

use crate::error::{Result, SluiceError};
use crate::grammar::Grammar;
use crate::row::Row;
use crate::value::Value;

/// How a backend reports the id of a multi-row INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertIdMode {
    /// The reported id belongs to the first inserted row
    FirstOfBatch,
    /// The reported id belongs to the last inserted row
    #[default]
    LastOfBatch,
    /// Ids of multi-row inserts are unreliable; auto-id rows are inserted one
    /// statement at a time
    SingleRowOnly,
}

/// Forward-only, non-restartable sequence of result rows.
pub struct RowCursor<'c> {
    inner: Box<dyn Iterator<Item = Result<Row>> + 'c>,
}

impl<'c> RowCursor<'c> {
    pub fn new(inner: impl Iterator<Item = Result<Row>> + 'c) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl Iterator for RowCursor<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for RowCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowCursor").finish_non_exhaustive()
    }
}

/// A database session: executes compiled statements and owns transactions.
///
/// Statement failures must be reported as [`SluiceError::Execution`] carrying
/// the SQL text.
pub trait Connection {
    fn grammar(&self) -> &dyn Grammar;

    /// Runs a statement and returns the affected row count.
    fn execute(&self, sql: &str, bindings: &[Value]) -> Result<u64>;

    fn fetch_all(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>>;

    fn fetch_one(&self, sql: &str, bindings: &[Value]) -> Result<Option<Row>> {
        Ok(self.fetch_all(sql, bindings)?.into_iter().next())
    }

    fn cursor<'c>(&'c self, sql: &str, bindings: &[Value]) -> Result<RowCursor<'c>>;

    /// Id generated by the most recent INSERT on this session.
    fn last_insert_id(&self, column: Option<&str>) -> Result<Value>;

    fn insert_id_mode(&self) -> InsertIdMode {
        InsertIdMode::default()
    }

    /// Runs `body` atomically: commits when it returns `Ok`, rolls back
    /// everything it did otherwise. Calls may nest.
    fn transaction(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

/// Typed wrapper over [`Connection::transaction`].
pub fn transaction<C, T, F>(conn: &C, body: F) -> Result<T>
where
    C: Connection + ?Sized,
    F: FnOnce() -> Result<T>,
{
    let mut body = Some(body);
    let mut output = None;
    conn.transaction(&mut || {
        let body = body
            .take()
            .ok_or_else(|| SluiceError::Transaction("transaction body re-entered".into()))?;
        output = Some(body()?);
        Ok(())
    })?;
    output.ok_or_else(|| SluiceError::Transaction("transaction body did not run".into()))
}
