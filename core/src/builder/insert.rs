//! Multi-row INSERT with per-row id recovery.

use std::collections::BTreeMap;

use compact_str::CompactString;

use super::Builder;
use crate::attributes::Attributes;
use crate::connection::{Connection, InsertIdMode, transaction};
use crate::error::Result;
use crate::value::Value;

/// Outcome of [`Builder::insert`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertResult {
    /// Total affected rows
    pub affected: u64,
    /// Id of every input row, in input order
    pub ids: Vec<Value>,
}

impl Builder {
    /// Inserts `rows` into this statement's table, recovering ids from the
    /// connection's last insert id.
    pub fn insert(
        &self,
        conn: &dyn Connection,
        rows: &[Attributes],
        replace: bool,
    ) -> Result<InsertResult> {
        self.insert_keyed(conn, rows, replace, None)
    }

    /// Inserts `rows`; rows that carry `key` report that value as their id.
    ///
    /// Rows are grouped by their sorted column set and by whether they
    /// carry a non-null `key`; each group is inserted in batches no larger
    /// than the grammar's binding limit. Groups with explicit keys go first
    /// so generated ids never collide with them. All statements share one
    /// transaction. Generated ids are assumed contiguous within a batch,
    /// counted from the first or last id according to
    /// [`Connection::insert_id_mode`].
    pub fn insert_keyed(
        &self,
        conn: &dyn Connection,
        rows: &[Attributes],
        replace: bool,
        key: Option<&str>,
    ) -> Result<InsertResult> {
        if rows.is_empty() {
            return Ok(InsertResult::default());
        }

        // (generated, columns): explicit-key groups sort first.
        let mut shapes: BTreeMap<(bool, Vec<CompactString>), Vec<usize>> = BTreeMap::new();
        for (index, row) in rows.iter().enumerate() {
            let mut columns: Vec<CompactString> = row.keys().map(CompactString::from).collect();
            columns.sort();
            let generated = key.is_none_or(|key| row.get(key).is_none_or(Value::is_null));
            shapes.entry((generated, columns)).or_default().push(index);
        }

        let grammar = conn.grammar();
        let mode = conn.insert_id_mode();
        let mut ids = vec![Value::Null; rows.len()];

        let affected = transaction(conn, || {
            let mut affected = 0;
            for ((generated, columns), members) in &shapes {
                let names: Vec<&str> = columns.iter().map(CompactString::as_str).collect();
                let keyed = !generated;
                let chunk = batch_size(grammar.max_bindings(), names.len(), members.len(), keyed, mode);

                for batch in members.chunks(chunk) {
                    let values: Vec<Vec<Value>> = batch
                        .iter()
                        .map(|&i| {
                            names
                                .iter()
                                .map(|c| rows[i].get(c).cloned().unwrap_or_default())
                                .collect()
                        })
                        .collect();
                    let compiled = grammar.compile_insert(self, &names, &values, replace)?;
                    affected += conn.execute(&compiled.sql, &compiled.bindings)?;

                    if let (true, Some(key)) = (keyed, key) {
                        for &i in batch {
                            ids[i] = rows[i].get(key).cloned().unwrap_or_default();
                        }
                        continue;
                    }
                    let reported = conn.last_insert_id(key)?;
                    assign_ids(&mut ids, batch, reported, mode);
                }
            }
            Ok(affected)
        })?;

        Ok(InsertResult { affected, ids })
    }

    /// `INSERT INTO <table> (columns) <select>`
    pub fn insert_from(
        &self,
        conn: &dyn Connection,
        columns: &[&str],
        select: &Builder,
    ) -> Result<u64> {
        let compiled = conn.grammar().compile_insert_from(self, columns, select)?;
        conn.execute(&compiled.sql, &compiled.bindings)
    }

    /// Id generated by the most recent INSERT on `conn`.
    pub fn last_id(&self, conn: &dyn Connection, column: Option<&str>) -> Result<Value> {
        conn.last_insert_id(column)
    }
}

fn batch_size(
    max_bindings: Option<usize>,
    width: usize,
    rows: usize,
    keyed: bool,
    mode: InsertIdMode,
) -> usize {
    // DEFAULT VALUES inserts exactly one row.
    if width == 0 || (!keyed && mode == InsertIdMode::SingleRowOnly) {
        return 1;
    }
    match max_bindings {
        Some(max) => (max / width).clamp(1, rows.max(1)),
        None => rows.max(1),
    }
}

fn assign_ids(ids: &mut [Value], batch: &[usize], reported: Value, mode: InsertIdMode) {
    let Some(reported) = reported.as_i64() else {
        for &i in batch {
            ids[i] = reported.clone();
        }
        return;
    };
    let len = batch.len() as i64;
    let first = match mode {
        InsertIdMode::FirstOfBatch => reported,
        InsertIdMode::LastOfBatch | InsertIdMode::SingleRowOnly => reported - (len - 1),
    };
    for (offset, &i) in batch.iter().enumerate() {
        ids[i] = Value::Integer(first + offset as i64);
    }
}
