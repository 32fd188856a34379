use std::ops::{Deref, DerefMut};

use hashbrown::HashSet;

use super::Model;
use crate::connection::Connection;
use crate::error::Result;
use crate::helper::{EagerLoad, load_relations};
use crate::value::Value;

/// An ordered batch of models.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    models: Vec<Model>,
}

impl Collection {
    pub fn new(models: Vec<Model>) -> Self {
        Self { models }
    }

    pub fn into_vec(self) -> Vec<Model> {
        self.models
    }

    /// Distinct non-null values of `column`, in first-appearance order.
    pub fn keys(&self, column: &str) -> Vec<Value> {
        let mut seen = HashSet::new();
        self.models
            .iter()
            .filter_map(|model| model.get(column))
            .filter(|value| !value.is_null() && seen.insert(*value))
            .cloned()
            .collect()
    }

    /// Loads association paths for every model with one query per relation.
    pub fn load(&mut self, conn: &dyn Connection, paths: impl Into<EagerLoad>) -> Result<()> {
        load_relations(conn, &mut self.models, paths.into())
    }

    /// The model whose single-column primary key equals `key`.
    pub fn find_by_key(&self, key: &Value) -> Option<&Model> {
        self.models.iter().find(|model| {
            model
                .meta()
                .single_primary()
                .and_then(|column| model.get(column))
                == Some(key)
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.models.iter().map(Model::to_json).collect())
    }
}

impl Deref for Collection {
    type Target = Vec<Model>;

    fn deref(&self) -> &Self::Target {
        &self.models
    }
}

impl DerefMut for Collection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.models
    }
}

impl From<Vec<Model>> for Collection {
    fn from(models: Vec<Model>) -> Self {
        Self::new(models)
    }
}

impl FromIterator<Model> for Collection {
    fn from_iter<I: IntoIterator<Item = Model>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Collection {
    type Item = Model;
    type IntoIter = std::vec::IntoIter<Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Model;
    type IntoIter = std::slice::Iter<'a, Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.iter()
    }
}
