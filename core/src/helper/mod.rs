//! Eager loading: resolves relation paths for a batch of models with one
//! query per path segment.

mod tree;

pub use tree::{Constraint, EagerLoad, EagerNode, EagerTree};

use hashbrown::{HashMap, HashSet};

use crate::connection::Connection;
use crate::entity::{Collection, Model, Related};
use crate::error::{Result, SluiceError};
use crate::value::Value;

/// Loads every path of `eager` onto `models`.
///
/// Each tree level runs one query for the whole batch; nested paths are
/// loaded onto the related models before they are handed out to owners.
pub fn load_relations(conn: &dyn Connection, models: &mut [Model], eager: EagerLoad) -> Result<()> {
    let tree = eager.into_tree();
    for node in &tree.roots {
        load_node(conn, models, node)?;
    }
    Ok(())
}

fn load_node(conn: &dyn Connection, models: &mut [Model], node: &EagerNode) -> Result<()> {
    let Some(first) = models.first() else {
        return Ok(());
    };
    let mut relation = first.entity().relation(&node.name, first, conn).ok_or_else(|| {
        SluiceError::composition(format!(
            "{} has no relation named '{}'",
            first.meta().name,
            node.name
        ))
    })?;
    node.apply(&mut relation)?;

    let mut seen = HashSet::new();
    let keys: Vec<Value> = models
        .iter()
        .filter_map(|model| relation.owner_key_of(model))
        .filter(|key| seen.insert(key.clone()))
        .collect();

    tracing::debug!(
        relation = %node.name,
        owners = models.len(),
        keys = keys.len(),
        "sluice.eager"
    );

    let mut related = if keys.is_empty() {
        Vec::new()
    } else {
        relation.load_for(keys)?
    };
    for child in &node.children {
        load_node(conn, &mut related, child)?;
    }

    let mut grouped: HashMap<Value, Vec<Model>> = HashMap::new();
    for model in related {
        if let Some(key) = relation.group_key(&model) {
            grouped.entry(key).or_default().push(model);
        }
    }

    for model in models.iter_mut() {
        let matches = relation
            .owner_key_of(model)
            .and_then(|key| grouped.get(&key))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let value = if relation.is_many() {
            Related::Many(Collection::new(matches.to_vec()))
        } else {
            Related::One(matches.first().cloned().map(Box::new))
        };
        model.set_related(node.name.as_str(), value);
    }
    Ok(())
}
