//! SQLite backend for sluice.
//!
//! Provides the [`SQLiteGrammar`] statement compiler and the rusqlite-backed
//! [`SQLiteConnection`].
//!
//! ```no_run
//! use sluice_core::{Builder, Connection};
//! use sluice_sqlite::{SQLiteConfig, SQLiteConnection};
//!
//! fn main() -> sluice_core::Result<()> {
//!     let conn = SQLiteConnection::open(SQLiteConfig::memory())?;
//!     conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//!     let mut query = Builder::table("users");
//!     query.r#where("name", "ada");
//!     let rows = query.fetch_all(&conn)?;
//!     assert!(rows.is_empty());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod grammar;
pub mod values;

pub use config::{Location, SQLiteConfig, SQLiteTransactionType};
pub use connection::SQLiteConnection;
pub use grammar::SQLiteGrammar;
