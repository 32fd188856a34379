//! # sluice
//!
//! A composable SQL statement builder with an active-record layer,
//! associations and batched relation loading.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sluice::prelude::*;
//! use sluice::sqlite::SQLiteConnection;
//!
//! struct User;
//!
//! impl Entity for User {
//!     fn meta(&self) -> &EntityMeta {
//!         static META: EntityMeta = EntityMeta::new("User", "users");
//!         &META
//!     }
//! }
//!
//! # fn main() -> sluice::Result<()> {
//! let conn = SQLiteConnection::open_in_memory()?;
//! conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//! let users = ActiveRecord::new(&conn, &User);
//! let ada = users.create(Attributes::from([("name", "Ada")]))?;
//! let found = ActiveRecord::new(&conn, &User).find_or_throw(ada.get_i64("id")?.unwrap_or(0))?;
//! assert_eq!(found.get_str("name")?, Some("Ada"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! | Database | Driver   | Feature Flag | Status |
//! |----------|----------|--------------|--------|
//! | SQLite   | rusqlite | `sqlite`     | ✅     |

// =============================================================================
// Root-level exports
// =============================================================================

/// Result type for sluice operations
pub use sluice_core::error::Result;

/// Error types
pub mod error {
    pub use sluice_core::error::{BoxError, SluiceError};
}

pub use sluice_core::{sluice_trace_query, sluice_trace_tx};

// =============================================================================
// Core module - shared functionality
// =============================================================================

/// Dialect-agnostic building blocks.
///
/// # Module Structure
///
/// - **Composition**: `Expression`, `WhereClause`, `JoinClause`, `Builder`
/// - **Collaborators**: `Grammar`, `Connection`
/// - **Records**: `Entity`, `Model`, `Collection`, `ActiveRecord`, `Relation`
pub mod core {
    pub use sluice_core::*;
}

// =============================================================================
// SQLite module
// =============================================================================

/// SQLite grammar and rusqlite connection.
#[cfg(feature = "sqlite")]
pub mod sqlite {
    pub use sluice_sqlite::{
        Location, SQLiteConfig, SQLiteConnection, SQLiteGrammar, SQLiteTransactionType,
    };

    pub use sluice_sqlite::{config, grammar, values};
}

// =============================================================================
// Prelude
// =============================================================================

/// Everything needed to declare entities and compose queries.
pub mod prelude {
    pub use sluice_core::{
        Action, ActiveRecord, AggregateFn, Attributes, Builder, Collection, Connection,
        EagerLoad, Entity, EntityMeta, Expression, FetchMode, Fetched, FromRow, HookOutcome,
        InsertIdMode, JoinType, KeyMatch, Model, OrderBy, Operator, Outcome, PrimaryKey,
        Related, Relation, Row, SluiceError, Source, Value, WhereClause,
    };
}
