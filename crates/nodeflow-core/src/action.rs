use std::fmt::{self, Display};

use serde_json::Value;

/// Routing token returned by a node's post stage.
///
/// The flow looks up the successor registered for the returned action and
/// falls back to the [`Action::Default`] edge when no exact match exists.
/// `Default` is a distinct variant, so a user action that happens to be
/// spelled `"default"` never aliases the fallback edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Action {
    /// Default action (used for fallback routing)
    #[default]
    Default,
    /// Custom named action
    Named(String),
}

impl Action {
    /// Create an action from a name; an empty name is the default action.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() {
            Self::Default
        } else {
            Self::Named(name)
        }
    }

    /// Create a named action without normalizing: `""` and `"default"` both
    /// stay [`Action::Named`] and never equal [`Action::Default`].
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Get the name of this action
    pub fn name(&self) -> &str {
        match self {
            Self::Default => "default",
            Self::Named(name) => name,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// JSON representation used when actions are collected as opaque values.
    pub fn to_value(&self) -> Value {
        Value::String(self.name().to_string())
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<Option<String>> for Action {
    fn from(name: Option<String>) -> Self {
        name.map(Self::new).unwrap_or_default()
    }
}
