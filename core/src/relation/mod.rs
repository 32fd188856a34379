//! Associations between entities.
//!
//! A [`Relation`] is built by an entity's relation accessor for one owner
//! instance and is valid for the query or mutation that immediately
//! follows. The owning predicate is installed at most once per instance
//! (see [`Relation::constrain`]); callers needing a different key set must
//! obtain a fresh relation.

mod mutation;
mod pivot;

pub use pivot::{PIVOT_ALIAS, PIVOT_PREFIX, PivotDescriptor, PivotLayout, PivotSource};

use std::ops::{Deref, DerefMut};

use crate::active_record::ActiveRecord;
use crate::builder::{Builder, Source};
use crate::clause::Operator;
use crate::connection::Connection;
use crate::entity::{Collection, Entity, Model, Related};
use crate::error::Result;
use crate::expression::Expression;
use crate::fetch::{FetchMode, Fetched, shape};
use crate::join::JoinType;
use crate::row::{FromRow, Row};
use crate::value::Value;

/// Cardinality and key direction of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// The owner holds the foreign key
    BelongsTo,
    /// The target holds the foreign key; at most one match
    HasOne,
    /// The target holds the foreign key
    HasMany,
}

/// Which owner keys the relation query is restricted to.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyMatch {
    /// The owner instance's key
    Owner,
    /// A batch of owner keys
    In(Vec<Value>),
}

pub struct Relation<'c> {
    kind: RelationKind,
    record: ActiveRecord<'c>,
    owner_column: String,
    target_column: String,
    owner_key: Value,
    pivot: Option<PivotDescriptor>,
    free_value: Value,
    constrained: bool,
}

impl<'c> Relation<'c> {
    fn new(
        kind: RelationKind,
        conn: &'c dyn Connection,
        target: &'static dyn Entity,
        owner: &Model,
        foreign_key: &str,
        local_key: &str,
    ) -> Self {
        let (owner_column, target_column) = match kind {
            RelationKind::BelongsTo => (foreign_key, local_key),
            RelationKind::HasOne | RelationKind::HasMany => (local_key, foreign_key),
        };
        Self {
            kind,
            record: ActiveRecord::new(conn, target),
            owner_column: owner_column.to_string(),
            target_column: target_column.to_string(),
            owner_key: owner.get(owner_column).cloned().unwrap_or_default(),
            pivot: None,
            free_value: Value::Null,
            constrained: false,
        }
    }

    /// `owner.foreign_key` references `target.local_key`.
    pub fn belongs_to(
        conn: &'c dyn Connection,
        target: &'static dyn Entity,
        owner: &Model,
        foreign_key: &str,
        local_key: &str,
    ) -> Self {
        Self::new(RelationKind::BelongsTo, conn, target, owner, foreign_key, local_key)
    }

    /// `target.foreign_key` references `owner.local_key`; one match.
    pub fn has_one(
        conn: &'c dyn Connection,
        target: &'static dyn Entity,
        owner: &Model,
        foreign_key: &str,
        local_key: &str,
    ) -> Self {
        Self::new(RelationKind::HasOne, conn, target, owner, foreign_key, local_key)
    }

    /// `target.foreign_key` references `owner.local_key`.
    ///
    /// With a link table, `foreign_key` is the target column the link's
    /// relation key points at.
    pub fn has_many(
        conn: &'c dyn Connection,
        target: &'static dyn Entity,
        owner: &Model,
        foreign_key: &str,
        local_key: &str,
    ) -> Self {
        Self::new(RelationKind::HasMany, conn, target, owner, foreign_key, local_key)
    }

    // ==================== configuration ====================

    /// Routes the association through a plain link table.
    #[must_use]
    pub fn through_table(mut self, table: &str, relation_key: &str, parent_key: &str) -> Self {
        self.pivot = Some(PivotDescriptor::new(
            PivotSource::Table(table.to_string()),
            relation_key,
            parent_key,
        ));
        self
    }

    /// Routes the association through a mapped link entity.
    #[must_use]
    pub fn through_model(
        mut self,
        entity: &'static dyn Entity,
        relation_key: &str,
        parent_key: &str,
    ) -> Self {
        self.pivot = Some(PivotDescriptor::new(
            PivotSource::Entity(entity),
            relation_key,
            parent_key,
        ));
        self
    }

    /// The link table's own key column(s).
    #[must_use]
    pub fn pivot_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(pivot) = self.pivot.as_mut() {
            pivot.primary_key = columns.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Selects these link columns (plus the linking keys) instead of all.
    #[must_use]
    pub fn with_pivot<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(pivot) = self.pivot.as_mut() {
            let extra = pivot.columns.get_or_insert_with(Vec::new);
            extra.extend(columns.into_iter().map(Into::into));
        }
        self
    }

    /// Restricts link rows; `=` predicates are also written into new links.
    #[must_use]
    pub fn where_pivot(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_pivot_op(column, Operator::Eq, value)
    }

    #[must_use]
    pub fn where_pivot_op(
        mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        if let Some(pivot) = self.pivot.as_mut() {
            pivot
                .predicate
                .push((column.to_string(), operator, value.into()));
        }
        self
    }

    /// Value a released foreign key is reset to (default NULL).
    #[must_use]
    pub fn free_value(mut self, value: impl Into<Value>) -> Self {
        self.free_value = value.into();
        self
    }

    // ==================== accessors ====================

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn is_many(&self) -> bool {
        self.kind == RelationKind::HasMany
    }

    pub fn target(&self) -> &'static dyn Entity {
        self.record.entity()
    }

    pub fn pivot(&self) -> Option<&PivotDescriptor> {
        self.pivot.as_ref()
    }

    pub fn owner_key(&self) -> &Value {
        &self.owner_key
    }

    /// The target-side query, for scopes and primary-key filters.
    pub fn query(&mut self) -> &mut ActiveRecord<'c> {
        &mut self.record
    }

    fn conn(&self) -> &'c dyn Connection {
        self.record.connection()
    }

    fn target_table(&self) -> &'static str {
        self.record.meta().table
    }

    fn qualified_target(&self) -> String {
        format!("{}.{}", self.target_table(), self.target_column)
    }

    // ==================== constraint ====================

    /// Installs the owning predicate once per relation instance: key
    /// equality or membership on the target (direct), or an inner join of
    /// the link table aliased `pivot` with its columns selected as
    /// `pivot_<column>` and the parent key restricted (through).
    pub fn constrain(&mut self, keys: KeyMatch) -> Result<()> {
        if self.constrained {
            return Ok(());
        }
        self.constrained = true;

        let target = self.qualified_target();
        let column = match &self.pivot {
            None => target,
            Some(pivot) => {
                let builder: &mut Builder = &mut self.record;
                let relation_key = pivot.qualified(&pivot.relation_key);
                builder.join_where(
                    JoinType::Inner,
                    Source::aliased(pivot.table(), PIVOT_ALIAS),
                    |on| {
                        on.where_column(&relation_key, Operator::Eq, &target);
                    },
                );
                for (column, alias) in pivot.layout().aliases() {
                    builder.add_select_expr(
                        Expression::raw(pivot.qualified(column)).alias(alias),
                    );
                }
                for (column, operator, value) in &pivot.predicate {
                    builder.where_op(&pivot.qualified(column), *operator, value.clone());
                }
                pivot.qualified(&pivot.parent_key)
            }
        };

        match keys {
            KeyMatch::Owner if self.owner_key.is_null() => {
                // An unsaved owner has nothing related.
                self.record.where_raw(Expression::raw("0 = 1"));
            }
            KeyMatch::Owner => {
                let owner_key = self.owner_key.clone();
                self.record.r#where(&column, owner_key);
            }
            KeyMatch::In(values) => {
                self.record.where_in(&column, values);
            }
        }
        Ok(())
    }

    fn decode(&self, rows: &[Row]) -> Vec<Model> {
        let entity = self.target();
        match &self.pivot {
            Some(pivot) => {
                let layout = pivot.layout();
                rows.iter().map(|row| layout.decode(entity, row)).collect()
            }
            None => rows.iter().map(|row| Model::from_row(entity, row)).collect(),
        }
    }

    fn rows(&mut self) -> Result<Vec<Row>> {
        self.constrain(KeyMatch::Owner)?;
        let conn = self.conn();
        self.record.model_builder()?.fetch_all(conn)
    }

    // ==================== reads ====================

    /// Related models of the owner, shaped by cardinality.
    pub fn get(&mut self) -> Result<Related> {
        let mut models = self.find_many()?.into_vec();
        Ok(if self.is_many() {
            Related::Many(models.into())
        } else {
            models.truncate(1);
            Related::One(models.pop().map(Box::new))
        })
    }

    pub fn find_many(&mut self) -> Result<Collection> {
        let rows = self.rows()?;
        Ok(self.decode(&rows).into())
    }

    pub fn first(&mut self) -> Result<Option<Model>> {
        self.constrain(KeyMatch::Owner)?;
        let conn = self.conn();
        let row = self.record.model_builder()?.first(conn)?;
        Ok(row.and_then(|row| self.decode(std::slice::from_ref(&row)).pop()))
    }

    pub fn count(&mut self) -> Result<u64> {
        self.constrain(KeyMatch::Owner)?;
        self.record.count()
    }

    pub fn exists(&mut self) -> Result<bool> {
        self.constrain(KeyMatch::Owner)?;
        self.record.exists()
    }

    /// Results in the requested shape. JSON output nests the link record
    /// under `pivot`; row output keeps the `pivot_<column>` columns.
    pub fn fetch_as(&mut self, mode: FetchMode) -> Result<Fetched> {
        let rows = self.rows()?;
        match mode {
            FetchMode::Json => Ok(Fetched::Json(
                self.decode(&rows).iter().map(Model::to_json).collect(),
            )),
            other => shape(rows, other),
        }
    }

    pub fn fetch_typed<T: FromRow>(&mut self) -> Result<Vec<T>> {
        self.rows()?.iter().map(T::from_row).collect()
    }

    /// Decoded models passed through a transform callback.
    pub fn fetch_map<T, F>(&mut self, f: F) -> Result<Vec<T>>
    where
        F: FnMut(Model) -> Result<T>,
    {
        let rows = self.rows()?;
        self.decode(&rows).into_iter().map(f).collect()
    }

    // ==================== batch loading ====================

    /// The value of `model` that relation results are matched against.
    pub fn owner_key_of(&self, model: &Model) -> Option<Value> {
        model
            .get(&self.owner_column)
            .filter(|value| !value.is_null())
            .cloned()
    }

    /// The owner key a loaded related model belongs to.
    pub fn group_key(&self, model: &Model) -> Option<Value> {
        let value = match &self.pivot {
            Some(pivot) => model.pivot().and_then(|p| p.get(&pivot.parent_key)),
            None => model.get(&self.target_column),
        };
        value.filter(|value| !value.is_null()).cloned()
    }

    /// Related models of every owner in `keys`, in one query.
    pub fn load_for(&mut self, keys: Vec<Value>) -> Result<Vec<Model>> {
        self.constrain(KeyMatch::In(keys))?;
        let conn = self.conn();
        let rows = self.record.model_builder()?.fetch_all(conn)?;
        Ok(self.decode(&rows))
    }
}

impl Deref for Relation<'_> {
    type Target = Builder;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

impl DerefMut for Relation<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.record
    }
}
