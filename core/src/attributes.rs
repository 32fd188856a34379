//! Ordered key-value store used for model attributes and insert/update data.

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::error::{Result, SluiceError};
use crate::row::Row;
use crate::value::Value;

/// Column → value map that keeps insertion order.
///
/// Reading a key that was never set is an [`SluiceError::UndefinedAttribute`]
/// fault through the `try_*`/typed getters; [`Attributes::get`] is the
/// non-failing lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: SmallVec<[(CompactString, Value); 8]>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// First-occurrence copy of every column of `row`.
    pub fn from_row(row: &Row) -> Self {
        let mut attributes = Self::new();
        for (column, value) in row.iter() {
            if !attributes.contains(column) {
                attributes.entries.push((column.into(), value.clone()));
            }
        }
        attributes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Lookup that faults on an undefined key.
    pub fn try_get(&self, key: &str) -> Result<&Value> {
        self.get(key)
            .ok_or_else(|| SluiceError::UndefinedAttribute(key.to_string()))
    }

    /// Sets `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<CompactString>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Builder-style [`Attributes::set`].
    pub fn with(mut self, key: impl Into<CompactString>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merges `other` into `self`; keys in `other` win.
    pub fn merge(&mut self, other: &Attributes) {
        for (key, value) in other.iter() {
            self.set(key, value.clone());
        }
    }

    /// Entries sorted by column name.
    pub fn sorted(&self) -> Vec<(CompactString, Value)> {
        let mut entries: Vec<_> = self.entries.iter().cloned().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Keys whose value differs from (or is absent in) `original`.
    pub fn diff(&self, original: &Attributes) -> Attributes {
        self.iter()
            .filter(|(key, value)| original.get(key) != Some(*value))
            .map(|(key, value)| (key, value.clone()))
            .collect()
    }

    // ==================== typed getters ====================

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        typed(self.try_get(key)?, key, "an integer", Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        typed(self.try_get(key)?, key, "a real", Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        typed(self.try_get(key)?, key, "a boolean", Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.try_get(key)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s)),
            other => Err(SluiceError::shape(format!(
                "attribute '{key}' is not text: {other:?}"
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.iter()
            .map(|(k, v)| (k.to_string(), v.to_json()))
            .collect()
    }
}

fn typed<T>(
    value: &Value,
    key: &str,
    expected: &str,
    read: impl Fn(&Value) -> Option<T>,
) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    read(value).map(Some).ok_or_else(|| {
        SluiceError::shape(format!("attribute '{key}' is not {expected}: {value:?}"))
    })
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<CompactString>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (key, value) in iter {
            attributes.set(key, value);
        }
        attributes
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Attributes
where
    K: Into<CompactString>,
    V: Into<Value>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}
