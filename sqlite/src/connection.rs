//! rusqlite-backed [`Connection`].

use std::cell::Cell;
use std::sync::Arc;

use compact_str::CompactString;
use ouroboros::self_referencing;
use rusqlite::{CachedStatement, params_from_iter};
use sluice_core::connection::{Connection, InsertIdMode, RowCursor};
use sluice_core::error::{Result, SluiceError};
use sluice_core::grammar::Grammar;
use sluice_core::row::Row;
use sluice_core::value::Value;
use sluice_core::{sluice_trace_query, sluice_trace_tx};

use crate::config::{Location, SQLiteConfig};
use crate::grammar::SQLiteGrammar;
use crate::values::{binds, value_from_ref};

/// A single SQLite session.
///
/// Transactions nest: the outermost one issues `BEGIN`, inner ones use
/// savepoints, so an inner failure only undoes its own work unless the
/// error is propagated outward.
#[derive(Debug)]
pub struct SQLiteConnection {
    conn: rusqlite::Connection,
    grammar: SQLiteGrammar,
    config: SQLiteConfig,
    depth: Cell<usize>,
}

impl SQLiteConnection {
    /// Opens the configured database and applies its pragmas.
    pub fn open(config: SQLiteConfig) -> Result<Self> {
        let conn = match &config.location {
            Location::Memory => rusqlite::Connection::open_in_memory(),
            Location::Path(path) => rusqlite::Connection::open(path),
        }
        .map_err(|e| SluiceError::Transaction(format!("failed to open database: {e}")))?;
        Self::from_connection(conn, config)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(SQLiteConfig::memory())
    }

    /// Wraps an existing rusqlite connection.
    pub fn from_connection(conn: rusqlite::Connection, config: SQLiteConfig) -> Result<Self> {
        if let Some(timeout) = config.busy_timeout {
            conn.busy_timeout(timeout)
                .map_err(|e| SluiceError::execution("PRAGMA busy_timeout", &[], e))?;
        }
        let pragma = if config.foreign_keys {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        conn.execute_batch(pragma)
            .map_err(|e| SluiceError::execution(pragma, &[], e))?;
        Ok(Self {
            conn,
            grammar: SQLiteGrammar::new().with_max_bindings(config.max_bindings),
            config,
            depth: Cell::new(0),
        })
    }

    #[inline]
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    pub fn config(&self) -> &SQLiteConfig {
        &self.config
    }

    /// Runs a batch of `;`-separated statements without bindings.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        sluice_trace_query!(sql, 0);
        self.conn
            .execute_batch(sql)
            .map_err(|e| SluiceError::execution(sql, &[], e))
    }

    fn control(&self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| SluiceError::Transaction(format!("{sql} failed: {e}")))
    }

    fn begin(&self, depth: usize) -> Result<()> {
        if depth == 0 {
            sluice_trace_tx!("begin", "sqlite.rusqlite");
            self.control(self.config.transaction_type.begin_sql())
        } else {
            sluice_trace_tx!("savepoint", "sqlite.rusqlite");
            self.control(&format!("SAVEPOINT sluice_{depth}"))
        }
    }

    fn commit(&self, depth: usize) -> Result<()> {
        if depth == 0 {
            sluice_trace_tx!("commit", "sqlite.rusqlite");
            self.control("COMMIT")
        } else {
            sluice_trace_tx!("savepoint.release", "sqlite.rusqlite");
            self.control(&format!("RELEASE SAVEPOINT sluice_{depth}"))
        }
    }

    fn rollback(&self, depth: usize) -> Result<()> {
        if depth == 0 {
            sluice_trace_tx!("rollback", "sqlite.rusqlite");
            self.control("ROLLBACK")
        } else {
            sluice_trace_tx!("savepoint.rollback", "sqlite.rusqlite");
            self.control(&format!(
                "ROLLBACK TO SAVEPOINT sluice_{depth}; RELEASE SAVEPOINT sluice_{depth}"
            ))
        }
    }
}

impl Connection for SQLiteConnection {
    fn grammar(&self) -> &dyn Grammar {
        &self.grammar
    }

    fn execute(&self, sql: &str, bindings: &[Value]) -> Result<u64> {
        sluice_trace_query!(sql, bindings.len());
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| SluiceError::execution(sql, bindings, e))?;
        let affected = stmt
            .execute(params_from_iter(binds(bindings)))
            .map_err(|e| SluiceError::execution(sql, bindings, e))?;
        Ok(affected as u64)
    }

    fn fetch_all(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>> {
        sluice_trace_query!(sql, bindings.len());
        let fail = |e: rusqlite::Error| SluiceError::execution(sql, bindings, e);
        let mut stmt = self.conn.prepare_cached(sql).map_err(fail)?;
        let columns = column_names(&stmt);
        let mut rows = stmt.query(params_from_iter(binds(bindings))).map_err(fail)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(fail)? {
            out.push(decode_row(row, &columns).map_err(fail)?);
        }
        Ok(out)
    }

    fn cursor<'c>(&'c self, sql: &str, bindings: &[Value]) -> Result<RowCursor<'c>> {
        sluice_trace_query!(sql, bindings.len());
        let fail = |e: rusqlite::Error| SluiceError::execution(sql, bindings, e);
        let stmt = self.conn.prepare_cached(sql).map_err(fail)?;
        let columns = column_names(&stmt);
        let live = LiveRows::try_new(stmt, |stmt| {
            stmt.query(params_from_iter(binds(bindings)))
        })
        .map_err(fail)?;
        Ok(RowCursor::new(StreamingRows {
            live,
            columns,
            sql: sql.to_string(),
            bindings: bindings.to_vec(),
            done: false,
        }))
    }

    fn last_insert_id(&self, _column: Option<&str>) -> Result<Value> {
        Ok(Value::Integer(self.conn.last_insert_rowid()))
    }

    fn insert_id_mode(&self) -> InsertIdMode {
        self.config.insert_id_mode
    }

    fn transaction(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let depth = self.depth.get();
        self.begin(depth)?;
        self.depth.set(depth + 1);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body()));
        self.depth.set(depth);

        match result {
            Ok(Ok(())) => self.commit(depth),
            Ok(Err(e)) => {
                self.rollback(depth)?;
                Err(e)
            }
            Err(panic_payload) => {
                let _ = self.rollback(depth);
                std::panic::resume_unwind(panic_payload);
            }
        }
    }
}

// =============================================================================
// Row streaming
// =============================================================================

fn column_names(stmt: &rusqlite::Statement<'_>) -> Arc<[CompactString]> {
    stmt.column_names()
        .into_iter()
        .map(CompactString::from)
        .collect()
}

fn decode_row(row: &rusqlite::Row<'_>, columns: &Arc<[CompactString]>) -> rusqlite::Result<Row> {
    let mut values = Vec::with_capacity(columns.len());
    for index in 0..columns.len() {
        values.push(value_from_ref(row.get_ref(index)?));
    }
    Ok(Row::new(Arc::clone(columns), values))
}

/// A prepared statement together with the result set stepping over it.
#[self_referencing]
struct LiveRows<'c> {
    stmt: CachedStatement<'c>,
    #[borrows(mut stmt)]
    #[not_covariant]
    rows: rusqlite::Rows<'this>,
}

/// Steps the statement one row per `next`; nothing is buffered.
struct StreamingRows<'c> {
    live: LiveRows<'c>,
    columns: Arc<[CompactString]>,
    sql: String,
    bindings: Vec<Value>,
    done: bool,
}

impl Iterator for StreamingRows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let columns = &self.columns;
        let stepped = self.live.with_rows_mut(|rows| match rows.next() {
            Ok(Some(row)) => Some(decode_row(row, columns)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        });
        match stepped {
            Some(Ok(row)) => Some(Ok(row)),
            Some(Err(e)) => {
                self.done = true;
                Some(Err(SluiceError::execution(&self.sql, &self.bindings, e)))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}
