use thiserror::Error;

use crate::value::{Value, render_inline};

/// Boxed driver error carried by [`SluiceError::Execution`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum SluiceError {
    /// Invalid argument shape or arity passed to a clause or builder call
    #[error("Composition error: {0}")]
    Composition(String),

    /// A fetch-shape rule was violated (e.g. key-pair mode without exactly two columns)
    #[error("Fetch shape error: {0}")]
    FetchShape(String),

    /// Read of a key that is not present in a model's attribute store
    #[error("Undefined attribute: {0}")]
    UndefinedAttribute(String),

    /// No row matched the identity that was looked up
    #[error("No {entity} found for key {key}")]
    NotFound { entity: String, key: String },

    /// A statement failed; `sql` has the bindings rendered inline
    #[error("Execution error: {source} (SQL: {sql})")]
    Execution {
        sql: String,
        #[source]
        source: BoxError,
    },

    /// Error with transaction
    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl SluiceError {
    /// Creates a composition fault.
    pub fn composition(message: impl Into<String>) -> Self {
        Self::Composition(message.into())
    }

    /// Creates a fetch-shape fault.
    pub fn shape(message: impl Into<String>) -> Self {
        Self::FetchShape(message.into())
    }

    /// Creates a not-found fault for the given entity and rendered key values.
    pub fn not_found(entity: impl Into<String>, key: &[Value]) -> Self {
        let key = match key {
            [single] => single.to_sql_literal(),
            many => {
                let parts: Vec<String> = many.iter().map(Value::to_sql_literal).collect();
                format!("({})", parts.join(", "))
            }
        };
        Self::NotFound {
            entity: entity.into(),
            key,
        }
    }

    /// Wraps a driver failure together with the statement that caused it.
    pub fn execution(sql: &str, bindings: &[Value], source: impl Into<BoxError>) -> Self {
        Self::Execution {
            sql: render_inline(sql, bindings),
            source: source.into(),
        }
    }

    /// The SQL text attached to an execution fault.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Execution { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

/// Result type for sluice operations
pub type Result<T> = std::result::Result<T, SluiceError>;
