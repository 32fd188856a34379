//! End-to-end tests against an in-memory SQLite database.

mod insert;
mod mutation;
mod pivot;
mod transaction;
