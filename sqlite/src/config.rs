//! Backend configuration.

use std::path::PathBuf;
use std::time::Duration;

use sluice_core::connection::InsertIdMode;

use crate::grammar::DEFAULT_MAX_BINDINGS;

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Location {
    #[default]
    Memory,
    Path(PathBuf),
}

/// Lock mode used by the outermost `BEGIN` of a transaction.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SQLiteTransactionType {
    /// Locks are taken lazily by the first read or write.
    #[default]
    Deferred,
    /// Takes the write lock at `BEGIN`; readers still proceed.
    Immediate,
    /// Takes the write lock at `BEGIN` and, outside WAL mode, blocks readers.
    Exclusive,
}

impl SQLiteTransactionType {
    pub const fn begin_sql(self) -> &'static str {
        match self {
            SQLiteTransactionType::Deferred => "BEGIN DEFERRED",
            SQLiteTransactionType::Immediate => "BEGIN IMMEDIATE",
            SQLiteTransactionType::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// Settings applied when a [`SQLiteConnection`](crate::SQLiteConnection)
/// is opened.
///
/// ```ignore
/// let config = SQLiteConfig::memory()
///     .foreign_keys(true)
///     .max_bindings(32766);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SQLiteConfig {
    pub location: Location,
    pub insert_id_mode: InsertIdMode,
    pub max_bindings: usize,
    pub busy_timeout: Option<Duration>,
    pub foreign_keys: bool,
    pub transaction_type: SQLiteTransactionType,
}

impl Default for SQLiteConfig {
    fn default() -> Self {
        Self {
            location: Location::Memory,
            insert_id_mode: InsertIdMode::LastOfBatch,
            max_bindings: DEFAULT_MAX_BINDINGS,
            busy_timeout: None,
            foreign_keys: true,
            transaction_type: SQLiteTransactionType::Deferred,
        }
    }
}

impl SQLiteConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::Path(path.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn insert_id_mode(mut self, mode: InsertIdMode) -> Self {
        self.insert_id_mode = mode;
        self
    }

    #[must_use]
    pub fn max_bindings(mut self, max_bindings: usize) -> Self {
        self.max_bindings = max_bindings.max(1);
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    #[must_use]
    pub fn transaction_type(mut self, tx_type: SQLiteTransactionType) -> Self {
        self.transaction_type = tx_type;
        self
    }
}
