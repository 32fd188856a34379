use hashbrown::HashSet;
use smallvec::SmallVec;

use super::Builder;
use crate::attributes::Attributes;
use crate::connection::{Connection, transaction};
use crate::error::{Result, SluiceError};
use crate::value::Value;

type SearchKey = SmallVec<[Value; 2]>;

impl Builder {
    /// Updates rows whose `search_columns` already exist and inserts the
    /// rest, all in one transaction. Returns the summed affected count.
    ///
    /// Existing keys are found with a single SELECT restricted to the
    /// search values.
    pub fn upsert(
        &self,
        conn: &dyn Connection,
        rows: &[Attributes],
        search_columns: &[&str],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        if search_columns.is_empty() {
            return Err(SluiceError::composition("upsert requires search columns"));
        }
        let table = self
            .get_table()
            .ok_or_else(|| SluiceError::composition("upsert requires a table source"))?;

        let keys = rows
            .iter()
            .map(|row| search_key(row, search_columns))
            .collect::<Result<Vec<_>>>()?;

        let mut lookup = Builder::table(table);
        lookup.select(search_columns.iter().copied());
        if let [column] = search_columns {
            let mut seen = HashSet::new();
            let values: Vec<Value> = keys
                .iter()
                .filter(|key| seen.insert(*key))
                .map(|key| key[0].clone())
                .collect();
            lookup.where_in(column, values);
        } else {
            lookup.where_in_multi(search_columns, keys.iter().map(|key| key.to_vec()))?;
        }
        let existing: HashSet<SearchKey> = lookup
            .fetch_all(conn)?
            .into_iter()
            .map(|row| row.into_values().into_iter().collect())
            .collect();

        let (updates, inserts): (Vec<usize>, Vec<usize>) =
            (0..rows.len()).partition(|&i| existing.contains(&keys[i]));

        tracing::debug!(
            table,
            existing = updates.len(),
            new = inserts.len(),
            "sluice.upsert"
        );

        transaction(conn, || {
            let mut affected = 0;
            for &i in &updates {
                let mut data = rows[i].clone();
                for column in search_columns {
                    data.remove(column);
                }
                let mut query = Builder::table(table);
                query.where_pairs(search_columns.iter().copied().zip(keys[i].iter().cloned()));
                affected += query.update(conn, &data)?.unwrap_or(0);
            }
            let new_rows: Vec<Attributes> = inserts.iter().map(|&i| rows[i].clone()).collect();
            affected += self.insert(conn, &new_rows, false)?.affected;
            Ok(affected)
        })
    }
}

fn search_key(row: &Attributes, columns: &[&str]) -> Result<SearchKey> {
    columns
        .iter()
        .map(|column| {
            row.get(column).cloned().ok_or_else(|| {
                SluiceError::composition(format!("upsert row is missing search column '{column}'"))
            })
        })
        .collect()
}
