//! Mapped entity types.
//!
//! An entity type is a zero-sized marker implementing [`Entity`]: it hands
//! out its static [`EntityMeta`], runs named scopes against an
//! [`ActiveRecord`], and builds [`Relation`]s for its association names.

mod collection;
mod model;

pub use collection::Collection;
pub use model::{Model, Pivot, Related};

use crate::active_record::ActiveRecord;
use crate::connection::Connection;
use crate::error::{Result, SluiceError};
use crate::relation::Relation;
use crate::value::Value;

// =============================================================================
// Metadata
// =============================================================================

/// Per-type metadata, declared once as a `static`.
///
/// ```ignore
/// static META: EntityMeta = EntityMeta::new("Post", "posts")
///     .columns(&["id", "user_id", "title"]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityMeta {
    /// Display name used in diagnostics
    pub name: &'static str,
    pub table: &'static str,
    /// Primary-key column(s)
    pub primary: &'static [&'static str],
    /// Projected columns; empty selects `<table>.*`
    pub select: &'static [&'static str],
    /// Declared columns
    pub columns: &'static [&'static str],
}

impl EntityMeta {
    pub const fn new(name: &'static str, table: &'static str) -> Self {
        Self {
            name,
            table,
            primary: &["id"],
            select: &[],
            columns: &[],
        }
    }

    pub const fn primary(mut self, primary: &'static [&'static str]) -> Self {
        self.primary = primary;
        self
    }

    pub const fn select(mut self, select: &'static [&'static str]) -> Self {
        self.select = select;
        self
    }

    pub const fn columns(mut self, columns: &'static [&'static str]) -> Self {
        self.columns = columns;
        self
    }

    /// The single primary-key column, if the key is not composite.
    pub fn single_primary(&self) -> Option<&'static str> {
        match self.primary {
            [column] => Some(column),
            _ => None,
        }
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Persistence step a hook is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Update,
    Delete,
}

/// Hook verdict; `Cancel` skips the current step without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookOutcome {
    #[default]
    Continue,
    Cancel,
}

/// Result of a persistence or association step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// A hook cancelled the step; nothing was written for it
    Cancelled,
}

impl Outcome {
    pub fn is_done(self) -> bool {
        self == Outcome::Done
    }
}

// =============================================================================
// Entity
// =============================================================================

/// A mapped entity type.
pub trait Entity: 'static {
    fn meta(&self) -> &EntityMeta;

    /// Applies the named scope to `query`.
    fn scope(&self, name: &str, query: &mut ActiveRecord<'_>, args: &[Value]) -> Result<()> {
        let _ = (query, args);
        Err(SluiceError::composition(format!(
            "{} has no scope named '{name}'",
            self.meta().name
        )))
    }

    /// Scope applied to every query unless suppressed.
    fn default_scope(&self, query: &mut ActiveRecord<'_>) -> Result<()> {
        let _ = query;
        Ok(())
    }

    /// Builds the association called `name` for `owner`.
    fn relation<'c>(
        &self,
        name: &str,
        owner: &Model,
        conn: &'c dyn Connection,
    ) -> Option<Relation<'c>> {
        let _ = (name, owner, conn);
        None
    }

    fn saving(&self, model: &Model, action: Action) -> HookOutcome {
        let _ = (model, action);
        HookOutcome::Continue
    }
}
