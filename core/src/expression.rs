//! Raw SQL fragments with their positional bindings.

use crate::value::Value;

/// A raw SQL fragment, the values bound to its `?` placeholders, and an
/// optional alias.
///
/// `bindings.len()` must equal the number of positional placeholders the
/// fragment contributes, in left-to-right order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expression {
    pub text: Option<String>,
    pub bindings: Vec<Value>,
    pub alias: Option<String>,
}

impl Expression {
    /// A fragment without bindings.
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            bindings: Vec::new(),
            alias: None,
        }
    }

    /// A fragment with bindings.
    pub fn new<I, V>(text: impl Into<String>, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            text: Some(text.into()),
            bindings: bindings.into_iter().map(Into::into).collect(),
            alias: None,
        }
    }

    /// A single bound value: `?`.
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            text: Some("?".to_string()),
            bindings: vec![value.into()],
            alias: None,
        }
    }

    /// Sets the alias rendered as `<text> AS <alias>`.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[inline]
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    #[inline]
    pub fn bindings(&self) -> &[Value] {
        &self.bindings
    }

    #[inline]
    pub fn has_bindings(&self) -> bool {
        !self.bindings.is_empty()
    }
}

impl From<&str> for Expression {
    fn from(text: &str) -> Self {
        Expression::raw(text)
    }
}

impl From<String> for Expression {
    fn from(text: String) -> Self {
        Expression::raw(text)
    }
}
