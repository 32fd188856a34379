//! SQL text generation contract.

use crate::builder::Builder;
use crate::error::Result;
use crate::expression::Expression;
use crate::value::Value;

/// SQL text plus the values bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Compiled {
    pub sql: String,
    pub bindings: Vec<Value>,
}

impl Compiled {
    pub fn new(sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            bindings,
        }
    }
}

/// Dialect-specific compiler for [`Builder`] statements.
///
/// Every method must return bindings whose count equals the number of
/// positional placeholders in the SQL text.
pub trait Grammar {
    fn compile_select(&self, query: &Builder) -> Result<Compiled>;

    /// `SELECT EXISTS(<query>)`
    fn compile_exists(&self, query: &Builder) -> Result<Compiled>;

    /// Multi-row INSERT of `rows` (each as long as `columns`) into the
    /// query's table. An empty column list inserts default values.
    fn compile_insert(
        &self,
        query: &Builder,
        columns: &[&str],
        rows: &[Vec<Value>],
        replace: bool,
    ) -> Result<Compiled>;

    /// `INSERT INTO <table> (columns) <select>`
    fn compile_insert_from(
        &self,
        query: &Builder,
        columns: &[&str],
        select: &Builder,
    ) -> Result<Compiled>;

    /// UPDATE restricted by the query's predicates; `None` when `sets` is
    /// empty and there is nothing to execute.
    fn compile_update(
        &self,
        query: &Builder,
        sets: &[(String, Expression)],
    ) -> Result<Option<Compiled>>;

    fn compile_delete(&self, query: &Builder) -> Result<Compiled>;

    /// Largest number of bindings one statement may carry.
    fn max_bindings(&self) -> Option<usize> {
        None
    }
}
