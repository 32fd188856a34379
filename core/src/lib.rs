//! Core of the sluice data-access layer: query composition, entities,
//! relations and eager loading, independent of any database driver.
//!
//! Drivers implement [`Connection`] and [`Grammar`]; everything else is
//! built on those two seams.

pub mod active_record;
pub mod attributes;
pub mod builder;
pub mod clause;
pub mod connection;
pub mod entity;
pub mod error;
pub mod expression;
pub mod fetch;
pub mod grammar;
pub mod helper;
pub mod join;
pub mod relation;
pub mod row;
mod tracing;
pub mod value;

#[doc(hidden)]
pub use ::tracing as __tracing;

pub use active_record::{ActiveRecord, EagerQuery, ModelCursor, PrimaryKey};
pub use attributes::Attributes;
pub use builder::{
    AggregateFn, Builder, InsertResult, Lock, OrderBy, OrderByClause, Selection, Source, Union,
};
pub use clause::{Clause, ClauseKind, Connector, Operand, Operator, Predicate, WhereClause};
pub use connection::{Connection, InsertIdMode, RowCursor, transaction};
pub use entity::{
    Action, Collection, Entity, EntityMeta, HookOutcome, Model, Outcome, Pivot, Related,
};
pub use error::{BoxError, Result, SluiceError};
pub use expression::Expression;
pub use fetch::{FetchMode, Fetched};
pub use grammar::{Compiled, Grammar};
pub use helper::{EagerLoad, load_relations};
pub use join::{JoinClause, JoinCondition, JoinType};
pub use relation::{KeyMatch, Relation, RelationKind};
pub use row::{FromRow, Row};
pub use value::Value;
