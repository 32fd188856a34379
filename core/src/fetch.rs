//! Result shapes.
//!
//! Statements are always fetched as full [`Row`]s; the caller-requested
//! shape is rebuilt from them afterwards, applying the same validation a
//! driver-level fetch mode would.

use hashbrown::HashMap;

use crate::error::{Result, SluiceError};
use crate::row::Row;
use crate::value::Value;

/// Caller-requested row representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Rows with every column, duplicates included
    #[default]
    Assoc,
    /// One JSON object per row
    Json,
    /// One column of every row, by position
    Column(usize),
    /// `(first, second)` per row; requires exactly two columns
    KeyPair,
    /// Rows grouped by their first column, which is removed from each row;
    /// requires at least two columns
    Group,
}

/// Rows reshaped according to a [`FetchMode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Rows(Vec<Row>),
    Json(Vec<serde_json::Value>),
    Column(Vec<Value>),
    Pairs(Vec<(Value, Value)>),
    /// Groups in order of first appearance
    Groups(Vec<(Value, Vec<Row>)>),
}

impl Fetched {
    pub fn len(&self) -> usize {
        match self {
            Fetched::Rows(v) => v.len(),
            Fetched::Json(v) => v.len(),
            Fetched::Column(v) => v.len(),
            Fetched::Pairs(v) => v.len(),
            Fetched::Groups(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            Fetched::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<Vec<serde_json::Value>> {
        match self {
            Fetched::Json(values) => Some(values),
            _ => None,
        }
    }

    pub fn into_column(self) -> Option<Vec<Value>> {
        match self {
            Fetched::Column(values) => Some(values),
            _ => None,
        }
    }

    pub fn into_pairs(self) -> Option<Vec<(Value, Value)>> {
        match self {
            Fetched::Pairs(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn into_groups(self) -> Option<Vec<(Value, Vec<Row>)>> {
        match self {
            Fetched::Groups(groups) => Some(groups),
            _ => None,
        }
    }
}

/// Checks that rows of `width` columns can be fetched as `mode`.
pub fn validate(mode: FetchMode, width: usize) -> Result<()> {
    match mode {
        FetchMode::KeyPair if width != 2 => Err(SluiceError::shape(format!(
            "key-pair fetch requires exactly 2 columns, the result has {width}"
        ))),
        FetchMode::Column(index) if index >= width => Err(SluiceError::shape(format!(
            "column index {index} is out of range for {width} columns"
        ))),
        FetchMode::Group if width < 2 => Err(SluiceError::shape(format!(
            "grouped fetch requires at least 2 columns, the result has {width}"
        ))),
        _ => Ok(()),
    }
}

/// Reshapes `rows` as `mode`.
pub fn shape(rows: Vec<Row>, mode: FetchMode) -> Result<Fetched> {
    if let Some(first) = rows.first() {
        validate(mode, first.len())?;
    }
    Ok(match mode {
        FetchMode::Assoc => Fetched::Rows(rows),
        FetchMode::Json => Fetched::Json(rows.iter().map(Row::to_json).collect()),
        FetchMode::Column(index) => Fetched::Column(
            rows.into_iter()
                .map(|row| row.into_values().swap_remove(index))
                .collect(),
        ),
        FetchMode::KeyPair => Fetched::Pairs(
            rows.into_iter()
                .map(|row| {
                    let mut values = row.into_values().into_iter();
                    let key = values.next().unwrap_or_default();
                    let value = values.next().unwrap_or_default();
                    (key, value)
                })
                .collect(),
        ),
        FetchMode::Group => Fetched::Groups(group(rows)),
    })
}

fn group(rows: Vec<Row>) -> Vec<(Value, Vec<Row>)> {
    let mut index: HashMap<Value, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<Row>)> = Vec::new();
    for row in rows {
        let columns = row.columns()[1..].to_vec();
        let mut values = row.into_values();
        let key = values.remove(0);
        let rest = Row::new(columns.into(), values);
        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(rest),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![rest]));
            }
        }
    }
    groups
}
