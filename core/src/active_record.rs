//! Entity-bound queries.

use std::ops::{Deref, DerefMut};

use compact_str::CompactString;

use crate::attributes::Attributes;
use crate::builder::{Builder, InsertResult};
use crate::connection::{Connection, RowCursor};
use crate::entity::{Collection, Entity, EntityMeta, Model, Outcome};
use crate::error::{Result, SluiceError};
use crate::expression::Expression;
use crate::fetch::{FetchMode, Fetched, shape};
use crate::helper::{EagerLoad, load_relations};
use crate::row::FromRow;
use crate::value::Value;

// =============================================================================
// Primary keys
// =============================================================================

/// Identity passed to [`ActiveRecord::where_primary`].
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryKey {
    /// One row, single-column key
    One(Value),
    /// One row, composite key in key-column order
    Composite(Vec<Value>),
    /// Many rows, single-column key
    Many(Vec<Value>),
    /// Many rows, composite key
    ManyComposite(Vec<Vec<Value>>),
}

impl PrimaryKey {
    pub fn many<I, V>(keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        PrimaryKey::Many(keys.into_iter().map(Into::into).collect())
    }

    pub fn composite<I, V>(key: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        PrimaryKey::Composite(key.into_iter().map(Into::into).collect())
    }

    /// Values in row-major order, for diagnostics.
    pub fn values(&self) -> Vec<Value> {
        match self {
            PrimaryKey::One(v) => vec![v.clone()],
            PrimaryKey::Composite(vs) | PrimaryKey::Many(vs) => vs.clone(),
            PrimaryKey::ManyComposite(rows) => rows.iter().flatten().cloned().collect(),
        }
    }
}

macro_rules! impl_primary_key_from {
    ($($ty:ty),* $(,)?) => { $(
        impl From<$ty> for PrimaryKey {
            fn from(value: $ty) -> Self {
                PrimaryKey::One(value.into())
            }
        }
    )* };
}

impl_primary_key_from!(i32, i64, u32, &str, String, Value);

// =============================================================================
// ActiveRecord
// =============================================================================

/// A [`Builder`] bound to one entity type and connection.
///
/// Starts as `SELECT <select columns> FROM <table>` with bare predicate
/// columns qualified by the table. Named scopes are queued and run once
/// each, in first-queued order, when the statement is built.
pub struct ActiveRecord<'c> {
    conn: &'c dyn Connection,
    entity: &'static dyn Entity,
    builder: Builder,
    scopes: Vec<(CompactString, Vec<Value>)>,
    applied: Vec<CompactString>,
    default_scope: bool,
    default_applied: bool,
    primary_applied: bool,
    bypass_primary: bool,
}

impl<'c> ActiveRecord<'c> {
    pub fn new(conn: &'c dyn Connection, entity: &'static dyn Entity) -> Self {
        let meta = entity.meta();
        let mut builder = Builder::table(meta.table);
        builder.prefix(meta.table);
        if meta.select.is_empty() {
            builder.select([format!("{}.*", meta.table)]);
        } else {
            builder.select(meta.select.iter().map(|column| {
                if column.contains('.') || column.contains('(') {
                    column.to_string()
                } else {
                    format!("{}.{column}", meta.table)
                }
            }));
        }
        Self {
            conn,
            entity,
            builder,
            scopes: Vec::new(),
            applied: Vec::new(),
            default_scope: true,
            default_applied: false,
            primary_applied: false,
            bypass_primary: false,
        }
    }

    #[inline]
    pub fn connection(&self) -> &'c dyn Connection {
        self.conn
    }

    #[inline]
    pub fn entity(&self) -> &'static dyn Entity {
        self.entity
    }

    #[inline]
    pub fn meta(&self) -> &'static EntityMeta {
        self.entity.meta()
    }

    // ==================== scopes ====================

    pub fn without_default_scope(&mut self) -> &mut Self {
        self.default_scope = false;
        self
    }

    /// Queues a named scope; a name already queued or applied is ignored.
    pub fn add_scope<I, V>(&mut self, name: &str, args: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let known = self.scopes.iter().any(|(n, _)| n == name)
            || self.applied.iter().any(|n| n == name);
        if !known {
            let args = args.into_iter().map(Into::into).collect();
            self.scopes.push((name.into(), args));
        }
        self
    }

    /// Applies the default scope and every queued scope, then returns the
    /// statement ready for execution.
    pub fn model_builder(&mut self) -> Result<&Builder> {
        let entity = self.entity;
        if self.default_scope && !self.default_applied {
            self.default_applied = true;
            entity.default_scope(self)?;
        }
        // Scopes may queue further scopes.
        while !self.scopes.is_empty() {
            let (name, args) = self.scopes.remove(0);
            self.applied.push(name.clone());
            entity.scope(&name, self, &args)?;
        }
        Ok(&self.builder)
    }

    // ==================== primary key ====================

    /// Skips every later [`ActiveRecord::where_primary`] call.
    pub fn bypass_primary(&mut self) -> &mut Self {
        self.bypass_primary = true;
        self
    }

    /// Restricts the query to the given identity. Applied at most once per
    /// query; later calls are no-ops.
    pub fn where_primary(&mut self, key: impl Into<PrimaryKey>) -> Result<&mut Self> {
        if self.bypass_primary || self.primary_applied {
            return Ok(self);
        }
        let meta = self.meta();
        let columns = meta.primary;
        let arity = |len: usize| {
            if len == columns.len() {
                Ok(())
            } else {
                Err(SluiceError::composition(format!(
                    "{} has {} primary key column(s), got {len} value(s)",
                    meta.name,
                    columns.len()
                )))
            }
        };

        match key.into() {
            PrimaryKey::One(value) => {
                arity(1)?;
                self.builder.r#where(columns[0], value);
            }
            PrimaryKey::Composite(values) => {
                arity(values.len())?;
                self.builder.where_pairs(columns.iter().copied().zip(values));
            }
            PrimaryKey::Many(values) => {
                arity(1)?;
                self.builder.where_in(columns[0], values);
            }
            PrimaryKey::ManyComposite(rows) => {
                for row in &rows {
                    arity(row.len())?;
                }
                if let [column] = columns {
                    self.builder.where_in(column, rows.into_iter().flatten());
                } else {
                    self.builder.where_in_multi(columns, rows)?;
                }
            }
        }
        self.primary_applied = true;
        Ok(self)
    }

    // ==================== eager loading ====================

    /// Attaches association paths to load with the results.
    ///
    /// The returned query has no cursor variant.
    pub fn with(self, paths: impl Into<EagerLoad>) -> EagerQuery<'c> {
        EagerQuery {
            record: self,
            eager: paths.into(),
        }
    }

    // ==================== reads ====================

    pub fn find_many(&mut self) -> Result<Collection> {
        let entity = self.entity;
        let conn = self.conn;
        let rows = self.model_builder()?.fetch_all(conn)?;
        Ok(rows.iter().map(|row| Model::from_row(entity, row)).collect())
    }

    pub fn first(&mut self) -> Result<Option<Model>> {
        let entity = self.entity;
        let conn = self.conn;
        let row = self.model_builder()?.first(conn)?;
        Ok(row.map(|row| Model::from_row(entity, &row)))
    }

    pub fn find(&mut self, key: impl Into<PrimaryKey>) -> Result<Option<Model>> {
        self.where_primary(key)?;
        self.first()
    }

    /// Like [`ActiveRecord::find`], but a missing row is a
    /// [`SluiceError::NotFound`] fault.
    pub fn find_or_throw(&mut self, key: impl Into<PrimaryKey>) -> Result<Model> {
        let key = key.into();
        let values = key.values();
        self.find(key)?
            .ok_or_else(|| SluiceError::not_found(self.meta().name, &values))
    }

    /// Streams models one row at a time.
    pub fn find_cursor(&mut self) -> Result<ModelCursor<'c>> {
        let conn = self.conn;
        let rows = self.model_builder()?.cursor(conn)?;
        Ok(ModelCursor {
            rows,
            entity: self.entity,
        })
    }

    pub fn count(&mut self) -> Result<u64> {
        let conn = self.conn;
        self.model_builder()?.count(conn)
    }

    pub fn exists(&mut self) -> Result<bool> {
        let conn = self.conn;
        self.model_builder()?.exists(conn)
    }

    pub fn fetch_as(&mut self, mode: FetchMode) -> Result<Fetched> {
        let conn = self.conn;
        shape(self.model_builder()?.fetch_all(conn)?, mode)
    }

    pub fn fetch_typed<T: FromRow>(&mut self) -> Result<Vec<T>> {
        let conn = self.conn;
        self.model_builder()?.fetch_typed(conn)
    }

    /// Models passed through a transform callback.
    pub fn fetch_map<T, F>(&mut self, f: F) -> Result<Vec<T>>
    where
        F: FnMut(Model) -> Result<T>,
    {
        self.find_many()?.into_iter().map(f).collect()
    }

    // ==================== writes ====================

    /// Inserts attribute rows, reporting ids keyed by the single primary
    /// column when rows carry it.
    pub fn insert(&self, rows: &[Attributes]) -> Result<InsertResult> {
        self.builder
            .insert_keyed(self.conn, rows, false, self.meta().single_primary())
    }

    /// Inserts one row and returns it as a persisted model.
    pub fn create(&self, attributes: Attributes) -> Result<Model> {
        let mut model = Model::with_attributes(self.entity, attributes);
        model.save(self.conn)?;
        Ok(model)
    }

    pub fn update(&mut self, data: &Attributes) -> Result<Option<u64>> {
        let conn = self.conn;
        self.model_builder()?.update(conn, data)
    }

    pub fn update_with(&mut self, sets: &[(String, Expression)]) -> Result<Option<u64>> {
        let conn = self.conn;
        self.model_builder()?.update_with(conn, sets)
    }

    pub fn delete(&mut self) -> Result<u64> {
        let conn = self.conn;
        self.model_builder()?.delete(conn)
    }

    pub fn upsert(&self, rows: &[Attributes], search_columns: &[&str]) -> Result<u64> {
        self.builder.upsert(self.conn, rows, search_columns)
    }

    /// Inserts or updates `model`.
    pub fn save(&self, model: &mut Model) -> Result<Outcome> {
        model.save(self.conn)
    }

    pub fn delete_model(&self, model: &mut Model) -> Result<Outcome> {
        model.delete(self.conn)
    }
}

impl Deref for ActiveRecord<'_> {
    type Target = Builder;

    fn deref(&self) -> &Self::Target {
        &self.builder
    }
}

impl DerefMut for ActiveRecord<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.builder
    }
}

// =============================================================================
// Cursors and eager queries
// =============================================================================

/// Forward-only model iterator.
pub struct ModelCursor<'c> {
    rows: RowCursor<'c>,
    entity: &'static dyn Entity,
}

impl Iterator for ModelCursor<'_> {
    type Item = Result<Model>;

    fn next(&mut self) -> Option<Self::Item> {
        let entity = self.entity;
        self.rows
            .next()
            .map(|row| row.map(|row| Model::from_row(entity, &row)))
    }
}

/// An [`ActiveRecord`] with association paths to load alongside.
pub struct EagerQuery<'c> {
    record: ActiveRecord<'c>,
    eager: EagerLoad,
}

impl<'c> EagerQuery<'c> {
    /// Adds more paths.
    pub fn with(mut self, paths: impl Into<EagerLoad>) -> Self {
        self.eager.extend(paths.into());
        self
    }

    /// The underlying statement, for further composition.
    pub fn query(&mut self) -> &mut Builder {
        &mut self.record.builder
    }

    pub fn where_primary(&mut self, key: impl Into<PrimaryKey>) -> Result<&mut Self> {
        self.record.where_primary(key)?;
        Ok(self)
    }

    pub fn add_scope<I, V>(&mut self, name: &str, args: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record.add_scope(name, args);
        self
    }

    pub fn find_many(mut self) -> Result<Collection> {
        let mut models = self.record.find_many()?;
        load_relations(self.record.conn, &mut models, self.eager)?;
        Ok(models)
    }

    pub fn first(mut self) -> Result<Option<Model>> {
        let Some(mut model) = self.record.first()? else {
            return Ok(None);
        };
        load_relations(self.record.conn, std::slice::from_mut(&mut model), self.eager)?;
        Ok(Some(model))
    }

    pub fn find(mut self, key: impl Into<PrimaryKey>) -> Result<Option<Model>> {
        self.record.where_primary(key)?;
        self.first()
    }

    pub fn find_or_throw(mut self, key: impl Into<PrimaryKey>) -> Result<Model> {
        let key = key.into();
        let values = key.values();
        let name = self.record.meta().name;
        self.record.where_primary(key)?;
        self.first()?
            .ok_or_else(|| SluiceError::not_found(name, &values))
    }
}
