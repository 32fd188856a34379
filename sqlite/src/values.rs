//! Conversions between [`Value`] and rusqlite's value types.

use rusqlite::types::{ToSqlOutput, ValueRef};
use sluice_core::value::Value;

/// Borrowing adapter that binds a [`Value`] as a rusqlite parameter.
#[derive(Debug, Clone, Copy)]
pub struct Bind<'a>(pub &'a Value);

impl rusqlite::ToSql for Bind<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Copies a column value out of a rusqlite row.
pub fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(items) => Value::Text(String::from_utf8_lossy(items).into_owned()),
        ValueRef::Blob(items) => Value::Blob(items.to_vec()),
    }
}

/// Parameter iterator for `params_from_iter`.
pub fn binds(values: &[Value]) -> impl Iterator<Item = Bind<'_>> {
    values.iter().map(Bind)
}
