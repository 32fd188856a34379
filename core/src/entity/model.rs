use std::fmt;

use compact_str::CompactString;

use super::{Action, Collection, Entity, EntityMeta, HookOutcome, Outcome};
use crate::attributes::Attributes;
use crate::builder::Builder;
use crate::connection::Connection;
use crate::error::{Result, SluiceError};
use crate::helper::{EagerLoad, load_relations};
use crate::relation::Relation;
use crate::row::Row;
use crate::value::Value;

/// Loaded association data.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Option<Box<Model>>),
    Many(Collection),
}

impl Related {
    pub fn as_one(&self) -> Option<&Model> {
        match self {
            Related::One(model) => model.as_deref(),
            Related::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> Option<&Collection> {
        match self {
            Related::Many(models) => Some(models),
            Related::One(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Related::One(Some(model)) => model.to_json(),
            Related::One(None) => serde_json::Value::Null,
            Related::Many(models) => models.to_json(),
        }
    }
}

/// The link-table record a related model was reached through.
#[derive(Clone)]
pub struct Pivot {
    pub table: String,
    pub entity: Option<&'static dyn Entity>,
    pub attributes: Attributes,
}

impl Pivot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

impl fmt::Debug for Pivot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pivot")
            .field("table", &self.table)
            .field("entity", &self.entity.map(|e| e.meta().name))
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl PartialEq for Pivot {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.attributes == other.attributes
    }
}

// =============================================================================
// Model
// =============================================================================

/// One entity instance: its attributes, the values they were loaded with,
/// loaded associations and an optional pivot record.
#[derive(Clone)]
pub struct Model {
    entity: &'static dyn Entity,
    attributes: Attributes,
    original: Attributes,
    relations: Vec<(CompactString, Related)>,
    pivot: Option<Box<Pivot>>,
    exists: bool,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("entity", &self.meta().name)
            .field("attributes", &self.attributes)
            .field("relations", &self.relations)
            .field("pivot", &self.pivot)
            .field("exists", &self.exists)
            .finish()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.meta().name == other.meta().name
            && self.attributes == other.attributes
            && self.relations == other.relations
            && self.pivot == other.pivot
            && self.exists == other.exists
    }
}

impl Model {
    /// A new, unsaved instance.
    pub fn new(entity: &'static dyn Entity) -> Self {
        Self {
            entity,
            attributes: Attributes::new(),
            original: Attributes::new(),
            relations: Vec::new(),
            pivot: None,
            exists: false,
        }
    }

    pub fn with_attributes(entity: &'static dyn Entity, attributes: Attributes) -> Self {
        Self {
            attributes,
            ..Self::new(entity)
        }
    }

    /// A persisted instance from a result row (first occurrence per column).
    pub fn from_row(entity: &'static dyn Entity, row: &Row) -> Self {
        Self::from_attributes(entity, Attributes::from_row(row))
    }

    pub(crate) fn from_attributes(entity: &'static dyn Entity, attributes: Attributes) -> Self {
        Self {
            original: attributes.clone(),
            attributes,
            exists: true,
            ..Self::new(entity)
        }
    }

    #[inline]
    pub fn entity(&self) -> &'static dyn Entity {
        self.entity
    }

    #[inline]
    pub fn meta(&self) -> &EntityMeta {
        self.entity.meta()
    }

    #[inline]
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    // ==================== attributes ====================

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn try_get(&self, key: &str) -> Result<&Value> {
        self.attributes.try_get(key)
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.attributes.get_i64(key)
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        self.attributes.get_f64(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.attributes.get_bool(key)
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        self.attributes.get_str(key)
    }

    pub fn set(&mut self, key: impl Into<CompactString>, value: impl Into<Value>) -> &mut Self {
        self.attributes.set(key, value);
        self
    }

    pub fn fill(&mut self, attributes: &Attributes) -> &mut Self {
        self.attributes.merge(attributes);
        self
    }

    /// Attributes changed since the model was loaded or last saved.
    pub fn dirty(&self) -> Attributes {
        self.attributes.diff(&self.original)
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    /// Primary-key values in key-column order; missing columns are NULL.
    pub fn primary_key_values(&self) -> Vec<Value> {
        self.meta()
            .primary
            .iter()
            .map(|column| self.get(column).cloned().unwrap_or_default())
            .collect()
    }

    // ==================== associations ====================

    pub fn related(&self, name: &str) -> Option<&Related> {
        self.relations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, related)| related)
    }

    pub fn related_mut(&mut self, name: &str) -> Option<&mut Related> {
        self.relations
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, related)| related)
    }

    pub fn set_related(&mut self, name: impl Into<CompactString>, related: Related) {
        let name = name.into();
        match self.relations.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = related,
            None => self.relations.push((name, related)),
        }
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.iter().map(|(n, _)| n.as_str())
    }

    pub fn pivot(&self) -> Option<&Pivot> {
        self.pivot.as_deref()
    }

    pub(crate) fn set_pivot(&mut self, pivot: Pivot) {
        self.pivot = Some(Box::new(pivot));
    }

    /// A fresh query-ready association for this instance.
    pub fn relation<'c>(&self, name: &str, conn: &'c dyn Connection) -> Result<Relation<'c>> {
        self.entity.relation(name, self, conn).ok_or_else(|| {
            SluiceError::composition(format!(
                "{} has no relation named '{name}'",
                self.meta().name
            ))
        })
    }

    /// Loads association paths onto this instance after the fact.
    pub fn load(&mut self, conn: &dyn Connection, paths: impl Into<EagerLoad>) -> Result<()> {
        load_relations(conn, std::slice::from_mut(self), paths.into())
    }

    // ==================== persistence ====================

    fn key_query(&self) -> Result<Builder> {
        let meta = self.meta();
        let key = self.primary_key_values();
        if key.iter().any(Value::is_null) {
            return Err(SluiceError::composition(format!(
                "{} has no primary key value",
                meta.name
            )));
        }
        let mut query = Builder::table(meta.table);
        query.where_pairs(meta.primary.iter().copied().zip(key));
        Ok(query)
    }

    /// Inserts a new instance or updates its dirty attributes.
    pub fn save(&mut self, conn: &dyn Connection) -> Result<Outcome> {
        let action = if self.exists {
            Action::Update
        } else {
            Action::Insert
        };
        if self.entity.saving(self, action) == HookOutcome::Cancel {
            return Ok(Outcome::Cancelled);
        }

        let entity = self.entity;
        let meta = entity.meta();
        match action {
            Action::Insert => {
                let primary = meta.single_primary();
                let inserted = Builder::table(meta.table).insert_keyed(
                    conn,
                    std::slice::from_ref(&self.attributes),
                    false,
                    primary,
                )?;
                if let (Some(column), Some(id)) = (primary, inserted.ids.into_iter().next()) {
                    if self.get(column).is_none_or(Value::is_null) {
                        self.attributes.set(column, id);
                    }
                }
            }
            _ => {
                let dirty = self.dirty();
                if !dirty.is_empty() {
                    self.key_query()?.update(conn, &dirty)?;
                }
            }
        }
        self.original = self.attributes.clone();
        self.exists = true;
        Ok(Outcome::Done)
    }

    /// Deletes this instance by primary key.
    pub fn delete(&mut self, conn: &dyn Connection) -> Result<Outcome> {
        if !self.exists {
            return Ok(Outcome::Done);
        }
        if self.entity.saving(self, Action::Delete) == HookOutcome::Cancel {
            return Ok(Outcome::Cancelled);
        }
        self.key_query()?.delete(conn)?;
        self.exists = false;
        Ok(Outcome::Done)
    }

    // ==================== output ====================

    /// Attributes, then loaded associations by name, then `pivot`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = self.attributes.to_json();
        for (name, related) in &self.relations {
            map.insert(name.to_string(), related.to_json());
        }
        if let Some(pivot) = &self.pivot {
            map.insert(
                "pivot".to_string(),
                serde_json::Value::Object(pivot.attributes.to_json()),
            );
        }
        serde_json::Value::Object(map)
    }
}
