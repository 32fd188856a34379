//! Result rows and offset-based row extraction.
//!
//! A [`Row`] keeps every column a statement produced, in order, including
//! repeated names from joined tables. Lookups by name return the first
//! occurrence; [`Row::get_all`] exposes the rest so decoders can apply
//! positional grouping.

use std::sync::Arc;

use compact_str::CompactString;

use crate::error::{Result, SluiceError};
use crate::value::Value;

// =============================================================================
// Row
// =============================================================================

/// One result row: a shared column list plus the values in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[CompactString]>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a row; `values` must be as long as `columns`.
    pub fn new(columns: Arc<[CompactString]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Builds a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<CompactString>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<CompactString>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn columns(&self) -> &[CompactString] {
        &self.columns
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// First value stored under `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column).map(|i| &self.values[i])
    }

    /// Every value stored under `column`, in select order.
    pub fn get_all<'r>(&'r self, column: &'r str) -> impl Iterator<Item = &'r Value> + 'r {
        self.columns
            .iter()
            .zip(self.values.iter())
            .filter(move |(c, _)| c.as_str() == column)
            .map(|(_, v)| v)
    }

    #[inline]
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.as_str() == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(CompactString::as_str)
            .zip(self.values.iter())
    }

    /// JSON object view; later duplicates do not overwrite earlier columns.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.len());
        for (column, value) in self.iter() {
            if !map.contains_key(column) {
                map.insert(column.to_string(), value.to_json());
            }
        }
        serde_json::Value::Object(map)
    }
}

// =============================================================================
// FromRow: offset-based row extraction
// =============================================================================

/// Extracts a Rust value from a [`Row`] at a given column offset.
///
/// Tuple impls compose: `(A, B)` reads A at `offset`, then B at
/// `offset + A::COLUMN_COUNT`.
#[diagnostic::on_unimplemented(
    message = "cannot decode `{Self}` from a result row",
    label = "this type does not implement FromRow"
)]
pub trait FromRow: Sized {
    /// Number of columns this type reads from the row.
    const COLUMN_COUNT: usize;

    /// Read this type from `row` starting at column `offset`.
    fn from_row_at(row: &Row, offset: usize) -> Result<Self>;

    /// Read from offset 0.
    fn from_row(row: &Row) -> Result<Self> {
        Self::from_row_at(row, 0)
    }
}

fn value_at(row: &Row, offset: usize) -> Result<&Value> {
    row.get_index(offset).ok_or_else(|| {
        SluiceError::shape(format!(
            "column index {offset} out of range for a row of {} columns",
            row.len()
        ))
    })
}

fn mismatch(offset: usize, expected: &str, found: &Value) -> SluiceError {
    SluiceError::shape(format!(
        "column {offset}: expected {expected}, found {found:?}"
    ))
}

impl FromRow for Value {
    const COLUMN_COUNT: usize = 1;
    fn from_row_at(row: &Row, offset: usize) -> Result<Self> {
        value_at(row, offset).cloned()
    }
}

impl FromRow for i64 {
    const COLUMN_COUNT: usize = 1;
    fn from_row_at(row: &Row, offset: usize) -> Result<Self> {
        let value = value_at(row, offset)?;
        value
            .as_i64()
            .ok_or_else(|| mismatch(offset, "an integer", value))
    }
}

macro_rules! impl_narrow_integer {
    ($($ty:ty),*) => { $(
        impl FromRow for $ty {
            const COLUMN_COUNT: usize = 1;
            fn from_row_at(row: &Row, offset: usize) -> Result<Self> {
                let wide = i64::from_row_at(row, offset)?;
                <$ty>::try_from(wide).map_err(|_| {
                    SluiceError::shape(format!(
                        "column {offset}: {wide} is out of range for {}",
                        stringify!($ty)
                    ))
                })
            }
        }
    )* }
}

impl_narrow_integer!(i32, u32);

impl FromRow for f64 {
    const COLUMN_COUNT: usize = 1;
    fn from_row_at(row: &Row, offset: usize) -> Result<Self> {
        let value = value_at(row, offset)?;
        value
            .as_f64()
            .ok_or_else(|| mismatch(offset, "a real", value))
    }
}

impl FromRow for bool {
    const COLUMN_COUNT: usize = 1;
    fn from_row_at(row: &Row, offset: usize) -> Result<Self> {
        let value = value_at(row, offset)?;
        value
            .as_bool()
            .ok_or_else(|| mismatch(offset, "a boolean", value))
    }
}

impl FromRow for String {
    const COLUMN_COUNT: usize = 1;
    fn from_row_at(row: &Row, offset: usize) -> Result<Self> {
        match value_at(row, offset)? {
            Value::Null => Err(mismatch(offset, "text", &Value::Null)),
            Value::Blob(b) => Ok(String::from_utf8_lossy(b).into_owned()),
            other => Ok(other.to_string()),
        }
    }
}

impl FromRow for Vec<u8> {
    const COLUMN_COUNT: usize = 1;
    fn from_row_at(row: &Row, offset: usize) -> Result<Self> {
        match value_at(row, offset)? {
            Value::Blob(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.clone().into_bytes()),
            other => Err(mismatch(offset, "a blob", other)),
        }
    }
}

impl<T: FromRow> FromRow for Option<T> {
    const COLUMN_COUNT: usize = T::COLUMN_COUNT;
    fn from_row_at(row: &Row, offset: usize) -> Result<Self> {
        if value_at(row, offset)?.is_null() {
            Ok(None)
        } else {
            T::from_row_at(row, offset).map(Some)
        }
    }
}

macro_rules! impl_from_row_tuple {
    ($($T:ident),+) => {
        impl<$($T: FromRow),+> FromRow for ($($T,)+) {
            const COLUMN_COUNT: usize = 0 $(+ <$T as FromRow>::COLUMN_COUNT)+;

            #[allow(non_snake_case)]
            fn from_row_at(row: &Row, offset: usize) -> Result<Self> {
                let mut __off = offset;
                $(
                    let $T = <$T as FromRow>::from_row_at(row, __off)?;
                    __off += <$T as FromRow>::COLUMN_COUNT;
                )+
                let _ = __off;
                Ok(($($T,)+))
            }
        }
    };
}

impl_from_row_tuple!(A);
impl_from_row_tuple!(A, B);
impl_from_row_tuple!(A, B, C);
impl_from_row_tuple!(A, B, C, D);
impl_from_row_tuple!(A, B, C, D, E);
impl_from_row_tuple!(A, B, C, D, E, F);
