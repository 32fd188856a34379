//! Association mutation: associate/dissociate, adding related models and
//! the hold/freed/remove set operations.
//!
//! Every operation is scoped to the owner key captured when the relation
//! was built. Direct has-relations move the target's foreign key; through
//! relations insert and delete link rows.

use hashbrown::HashSet;

use super::{PivotDescriptor, Relation, RelationKind};
use crate::active_record::{ActiveRecord, PrimaryKey};
use crate::attributes::Attributes;
use crate::builder::Builder;
use crate::clause::Operator;
use crate::connection::transaction;
use crate::entity::{Model, Outcome};
use crate::error::{Result, SluiceError};
use crate::value::Value;

impl Relation<'_> {
    fn require_owner_key(&self) -> Result<Value> {
        if self.owner_key.is_null() {
            return Err(SluiceError::composition(format!(
                "owner has no value for '{}'",
                self.owner_column
            )));
        }
        Ok(self.owner_key.clone())
    }

    fn require_has(&self, operation: &str) -> Result<()> {
        if self.kind == RelationKind::BelongsTo {
            return Err(SluiceError::composition(format!(
                "{operation} is not available on a belongs-to relation"
            )));
        }
        Ok(())
    }

    fn target_primary(&self) -> Result<&'static str> {
        let meta = self.record.meta();
        meta.single_primary().ok_or_else(|| {
            SluiceError::composition(format!(
                "{} needs a single-column primary key for set operations",
                meta.name
            ))
        })
    }

    fn target_lookup(&self) -> ActiveRecord<'_> {
        let mut record = ActiveRecord::new(self.conn(), self.target());
        record.without_default_scope();
        record
    }

    /// Link rows, restricted by the stored pivot predicate.
    fn link_query(pivot: &PivotDescriptor) -> Builder {
        let mut query = Builder::table(pivot.table());
        for (column, operator, value) in &pivot.predicate {
            query.where_op(column, *operator, value.clone());
        }
        query
    }

    /// The target-column value of the row identified by `key`.
    fn resolve(&self, key: PrimaryKey) -> Result<Value> {
        let meta = self.record.meta();
        if let (PrimaryKey::One(value), Some(primary)) = (&key, meta.single_primary()) {
            if primary == self.target_column {
                return Ok(value.clone());
            }
        }
        let target = self.target_lookup().find_or_throw(key)?;
        Ok(target.get(&self.target_column).cloned().unwrap_or_default())
    }

    /// Target-column values of the rows with primary keys `ids`.
    fn link_values(&self, ids: Vec<Value>) -> Result<Vec<Value>> {
        let primary = self.target_primary()?;
        let values = if primary == self.target_column {
            ids
        } else {
            let mut query = Builder::table(self.target_table());
            query.where_in(primary, ids);
            query.pluck(self.conn(), &self.target_column)?
        };
        let mut seen = HashSet::new();
        Ok(values
            .into_iter()
            .filter(|value| !value.is_null() && seen.insert(value.clone()))
            .collect())
    }

    /// Inserts the `parent`/`related` link, or updates its extra columns
    /// when it already exists.
    fn link(
        &self,
        pivot: &PivotDescriptor,
        parent: &Value,
        related: &Value,
        extras: &Attributes,
    ) -> Result<()> {
        let conn = self.conn();
        let mut existing = Self::link_query(pivot);
        existing
            .r#where(&pivot.parent_key, parent.clone())
            .r#where(&pivot.relation_key, related.clone());
        if existing.exists(conn)? {
            if !extras.is_empty() {
                existing.update(conn, extras)?;
            }
            return Ok(());
        }
        let mut row = pivot.pinned_values();
        row.merge(extras);
        row.set(pivot.parent_key.as_str(), parent.clone());
        row.set(pivot.relation_key.as_str(), related.clone());
        Builder::table(pivot.table()).insert(conn, &[row], false)?;
        Ok(())
    }

    fn set_foreign(&self, query: &Builder, value: Value) -> Result<u64> {
        let data = Attributes::new().with(self.target_column.as_str(), value);
        Ok(query.update(self.conn(), &data)?.unwrap_or(0))
    }

    // ==================== associate / dissociate ====================

    /// Links the row identified by `key` to the owner.
    ///
    /// Belongs-to sets the owner's foreign key (saving the owner when it
    /// is persisted); direct has-relations update the target's foreign key;
    /// through relations insert the link row. A composite `key` must match
    /// an existing row.
    pub fn associate(
        &mut self,
        owner: &mut Model,
        key: impl Into<PrimaryKey>,
    ) -> Result<Outcome> {
        self.associate_with(owner, key, &Attributes::new())
    }

    /// [`Relation::associate`] with extra link columns.
    pub fn associate_with(
        &mut self,
        owner: &mut Model,
        key: impl Into<PrimaryKey>,
        extras: &Attributes,
    ) -> Result<Outcome> {
        let key = key.into();
        if matches!(key, PrimaryKey::Many(_) | PrimaryKey::ManyComposite(_)) {
            return Err(SluiceError::composition(
                "associate takes the identity of one row",
            ));
        }

        if self.kind == RelationKind::BelongsTo {
            let value = self.resolve(key)?;
            owner.set(self.owner_column.as_str(), value.clone());
            self.owner_key = value;
            return if owner.exists() {
                owner.save(self.conn())
            } else {
                Ok(Outcome::Done)
            };
        }

        let parent = self.require_owner_key()?;
        match &self.pivot {
            Some(pivot) => {
                let related = self.resolve(key)?;
                self.link(pivot, &parent, &related, extras)?;
            }
            None => {
                if matches!(key, PrimaryKey::Composite(_)) {
                    self.target_lookup().find_or_throw(key.clone())?;
                }
                let mut target = self.target_lookup();
                target.where_primary(key)?;
                let data = Attributes::new().with(self.target_column.as_str(), parent);
                target.update(&data)?;
            }
        }
        Ok(Outcome::Done)
    }

    /// Releases the owner's association.
    ///
    /// Belongs-to resets the owner's foreign key to the free value; direct
    /// has-relations reset every target pointing at the owner; through
    /// relations delete the owner's link rows.
    pub fn dissociate(&mut self, owner: &mut Model) -> Result<Outcome> {
        if self.kind == RelationKind::BelongsTo {
            owner.set(self.owner_column.as_str(), self.free_value.clone());
            self.owner_key = self.free_value.clone();
            return if owner.exists() {
                owner.save(self.conn())
            } else {
                Ok(Outcome::Done)
            };
        }
        self.freed_all()?;
        Ok(Outcome::Done)
    }

    // ==================== adding related models ====================

    /// Saves `model` as related to the owner.
    pub fn add_model(&mut self, model: &mut Model) -> Result<Outcome> {
        let outcomes = self.add_collection(std::slice::from_mut(model))?;
        Ok(outcomes.into_iter().next().unwrap_or(Outcome::Done))
    }

    /// Saves `models` as related to the owner in one transaction.
    ///
    /// Direct relations set each model's foreign key before saving; through
    /// relations save each model and then link it. A model whose save hook
    /// cancels is skipped.
    pub fn add_collection(&mut self, models: &mut [Model]) -> Result<Vec<Outcome>> {
        self.require_has("add_collection")?;
        let parent = self.require_owner_key()?;
        let conn = self.conn();
        transaction(conn, || {
            let mut outcomes = Vec::with_capacity(models.len());
            for model in models.iter_mut() {
                let outcome = match &self.pivot {
                    None => {
                        model.set(self.target_column.as_str(), parent.clone());
                        model.save(conn)?
                    }
                    Some(pivot) => {
                        let outcome = model.save(conn)?;
                        if outcome.is_done() {
                            let related = model.try_get(&self.target_column)?.clone();
                            self.link(pivot, &parent, &related, &Attributes::new())?;
                        }
                        outcome
                    }
                };
                outcomes.push(outcome);
            }
            Ok(outcomes)
        })
    }

    // ==================== set operations ====================

    /// Makes the targets `ids` belong to the owner exclusively.
    ///
    /// Direct: points their foreign key at the owner. Through: removes
    /// their links to other owners and adds the missing links to this one.
    pub fn hold<I, V>(&mut self, ids: I) -> Result<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.hold_inner(ids.into_iter().map(Into::into).collect(), true)
    }

    /// Like [`Relation::hold`] without taking targets from other owners:
    /// direct relations only claim rows whose foreign key is NULL, the free
    /// value or already the owner; through relations only add links.
    pub fn hold_shared<I, V>(&mut self, ids: I) -> Result<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.hold_inner(ids.into_iter().map(Into::into).collect(), false)
    }

    fn hold_inner(&mut self, ids: Vec<Value>, exclusive: bool) -> Result<u64> {
        self.require_has("hold")?;
        let parent = self.require_owner_key()?;
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn();

        let Some(pivot) = &self.pivot else {
            let mut query = Builder::table(self.target_table());
            query.where_in(self.target_primary()?, ids);
            if !exclusive {
                let column = self.target_column.clone();
                let free = self.free_value.clone();
                let owner = parent.clone();
                query.where_group(|g| {
                    g.where_null(&column)
                        .or_where(&column, free)
                        .or_where(&column, owner);
                });
            }
            return self.set_foreign(&query, parent);
        };

        let related = self.link_values(ids)?;
        transaction(conn, || {
            if exclusive {
                let mut others = Self::link_query(pivot);
                others
                    .where_in(&pivot.relation_key, related.iter().cloned())
                    .where_op(&pivot.parent_key, Operator::NotEq, parent.clone());
                others.delete(conn)?;
            }

            let mut linked = Self::link_query(pivot);
            linked
                .r#where(&pivot.parent_key, parent.clone())
                .where_in(&pivot.relation_key, related.iter().cloned());
            let present: HashSet<Value> = linked
                .pluck(conn, &pivot.relation_key)?
                .into_iter()
                .collect();

            let pinned = pivot.pinned_values();
            let rows: Vec<Attributes> = related
                .iter()
                .filter(|value| !present.contains(*value))
                .map(|value| {
                    pinned
                        .clone()
                        .with(pivot.parent_key.as_str(), parent.clone())
                        .with(pivot.relation_key.as_str(), value.clone())
                })
                .collect();
            Ok(Builder::table(pivot.table()).insert(conn, &rows, false)?.affected)
        })
    }

    /// Releases the targets `ids` from the owner.
    ///
    /// Direct: resets their foreign key to the free value where it points
    /// at the owner. Through: deletes exactly those links of the owner.
    pub fn freed<I, V>(&mut self, ids: I) -> Result<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.require_has("freed")?;
        let parent = self.require_owner_key()?;
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        match &self.pivot {
            None => {
                let mut query = Builder::table(self.target_table());
                query
                    .where_in(self.target_primary()?, ids)
                    .r#where(&self.target_column, parent);
                self.set_foreign(&query, self.free_value.clone())
            }
            Some(pivot) => {
                let related = self.link_values(ids)?;
                let mut query = Self::link_query(pivot);
                query
                    .r#where(&pivot.parent_key, parent)
                    .where_in(&pivot.relation_key, related);
                query.delete(self.conn())
            }
        }
    }

    /// Releases every target of the owner.
    pub fn freed_all(&mut self) -> Result<u64> {
        self.require_has("freed_all")?;
        let parent = self.require_owner_key()?;
        match &self.pivot {
            None => {
                let mut query = Builder::table(self.target_table());
                query.r#where(&self.target_column, parent);
                self.set_foreign(&query, self.free_value.clone())
            }
            Some(pivot) => {
                let mut query = Self::link_query(pivot);
                query.r#where(&pivot.parent_key, parent);
                query.delete(self.conn())
            }
        }
    }

    /// Deletes the owner's targets among `ids`, and their links.
    ///
    /// Through relations delete the owner's links and then only those
    /// targets no other link row references. Returns the number of target
    /// rows deleted.
    pub fn remove<I, V>(&mut self, ids: I) -> Result<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        self.remove_inner(Some(ids))
    }

    /// Deletes every target of the owner, and their links, with the same
    /// sharing rule as [`Relation::remove`].
    pub fn remove_all(&mut self) -> Result<u64> {
        self.remove_inner(None)
    }

    fn remove_inner(&mut self, ids: Option<Vec<Value>>) -> Result<u64> {
        self.require_has("remove")?;
        let parent = self.require_owner_key()?;
        let conn = self.conn();

        let Some(pivot) = &self.pivot else {
            let mut query = Builder::table(self.target_table());
            if let Some(ids) = ids {
                query.where_in(self.target_primary()?, ids);
            }
            query.r#where(&self.target_column, parent);
            return query.delete(conn);
        };

        let related = match ids {
            Some(ids) => Some(self.link_values(ids)?),
            None => None,
        };
        transaction(conn, || {
            let mut links = Self::link_query(pivot);
            links.r#where(&pivot.parent_key, parent.clone());
            if let Some(related) = &related {
                links.where_in(&pivot.relation_key, related.iter().cloned());
            }
            let linked = links.pluck(conn, &pivot.relation_key)?;
            if linked.is_empty() {
                return Ok(0);
            }
            links.delete(conn)?;

            // Targets still linked to another owner are kept.
            let target_table = self.target_table();
            let mut still_linked = Builder::table(pivot.table());
            still_linked.select_raw("1").where_column(
                &format!("{}.{}", pivot.table(), pivot.relation_key),
                Operator::Eq,
                &format!("{target_table}.{}", self.target_column),
            );
            let mut targets = Builder::table(target_table);
            targets
                .where_in(&self.target_column, linked)
                .where_not_exists(still_linked);
            targets.delete(conn)
        })
    }
}
