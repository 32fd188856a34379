//! Link-table metadata and pivot-column decoding.
//!
//! A pivot-bearing query selects every pivot column under the alias
//! `pivot_<column>` and the descriptor keeps the exact alias list, so
//! decoding never has to guess which result columns belong to the link row.

use std::fmt;

use crate::attributes::Attributes;
use crate::clause::Operator;
use crate::entity::{Entity, Model, Pivot};
use crate::row::Row;
use crate::value::Value;

/// Alias of the joined link table.
pub const PIVOT_ALIAS: &str = "pivot";

/// Prefix of every selected pivot column.
pub const PIVOT_PREFIX: &str = "pivot_";

/// Where the link rows live.
#[derive(Clone)]
pub enum PivotSource {
    Table(String),
    Entity(&'static dyn Entity),
}

impl PivotSource {
    pub fn table(&self) -> &str {
        match self {
            PivotSource::Table(table) => table,
            PivotSource::Entity(entity) => entity.meta().table,
        }
    }

    pub fn entity(&self) -> Option<&'static dyn Entity> {
        match self {
            PivotSource::Table(_) => None,
            PivotSource::Entity(entity) => Some(*entity),
        }
    }
}

impl fmt::Debug for PivotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PivotSource::Table(table) => f.debug_tuple("Table").field(table).finish(),
            PivotSource::Entity(entity) => f.debug_tuple("Entity").field(&entity.meta().name).finish(),
        }
    }
}

/// The link table of a through-relation.
#[derive(Debug, Clone)]
pub struct PivotDescriptor {
    pub source: PivotSource,
    /// Link column matching the related entity
    pub relation_key: String,
    /// Link column matching the owner
    pub parent_key: String,
    /// The link table's own key
    pub primary_key: Vec<String>,
    /// Explicit extra columns; `None` selects all declared columns
    pub columns: Option<Vec<String>>,
    /// Extra predicates on the link rows
    pub predicate: Vec<(String, Operator, Value)>,
}

impl PivotDescriptor {
    pub fn new(source: PivotSource, relation_key: &str, parent_key: &str) -> Self {
        let primary_key = match &source {
            PivotSource::Entity(entity) => {
                entity.meta().primary.iter().map(|c| c.to_string()).collect()
            }
            PivotSource::Table(_) => Vec::new(),
        };
        Self {
            source,
            relation_key: relation_key.to_string(),
            parent_key: parent_key.to_string(),
            primary_key,
            columns: None,
            predicate: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        self.source.table()
    }

    /// Every link column the query selects, linking keys first, without
    /// duplicates.
    pub fn selected_columns(&self) -> Vec<String> {
        let mut columns = vec![self.relation_key.clone(), self.parent_key.clone()];
        let declared: Vec<String> = match (&self.columns, &self.source) {
            (Some(explicit), _) => explicit.clone(),
            (None, PivotSource::Entity(entity)) if !entity.meta().columns.is_empty() => {
                entity.meta().columns.iter().map(|c| c.to_string()).collect()
            }
            (None, _) => self.primary_key.clone(),
        };
        for column in declared {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    }

    /// Qualified link column, e.g. `pivot.user_id`.
    pub fn qualified(&self, column: &str) -> String {
        format!("{PIVOT_ALIAS}.{column}")
    }

    /// Link values the stored `=` predicates pin, written into new links.
    pub fn pinned_values(&self) -> Attributes {
        self.predicate
            .iter()
            .filter(|(_, operator, _)| *operator == Operator::Eq)
            .map(|(column, _, value)| (column.as_str(), value.clone()))
            .collect()
    }

    pub fn layout(&self) -> PivotLayout {
        let columns = self.selected_columns();
        let aliases = columns
            .iter()
            .map(|column| format!("{PIVOT_PREFIX}{column}"))
            .collect();
        PivotLayout {
            table: self.table().to_string(),
            entity: self.source.entity(),
            columns,
            aliases,
        }
    }
}

/// The exact pivot aliases of one query, used to split result rows.
#[derive(Clone)]
pub struct PivotLayout {
    table: String,
    entity: Option<&'static dyn Entity>,
    columns: Vec<String>,
    aliases: Vec<String>,
}

impl PivotLayout {
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .zip(self.aliases.iter())
            .map(|(c, a)| (c.as_str(), a.as_str()))
    }

    /// Splits `row` into the related model and its pivot record.
    ///
    /// Pivot aliases take their last occurrence; every other column keeps its
    /// first occurrence, later duplicates from joins are dropped.
    pub fn decode(&self, entity: &'static dyn Entity, row: &Row) -> Model {
        let mut attributes = Attributes::new();
        let mut pivot = Attributes::new();
        for (name, value) in row.iter() {
            match self.aliases.iter().position(|alias| alias == name) {
                Some(index) => {
                    pivot.set(self.columns[index].as_str(), value.clone());
                }
                None if !attributes.contains(name) => {
                    attributes.set(name, value.clone());
                }
                None => {}
            }
        }
        let mut model = Model::from_attributes(entity, attributes);
        model.set_pivot(Pivot {
            table: self.table.clone(),
            entity: self.entity,
            attributes: pivot,
        });
        model
    }
}
