//! Non-fatal findings collected while loading configuration.

use std::fmt;

/// One thing the operator should know about, with an optional fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// What was found.
    pub message: String,
    /// How to address it.
    pub hint: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{} ({hint})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Warnings in the order they were found.
#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    /// Collected warnings.
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    /// Record a warning without a hint.
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    /// Record a warning with a suggested fix.
    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    /// `true` when nothing was flagged.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of warnings.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Warnings in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, ConfigWarning> {
        self.items.iter()
    }

    /// Append every warning from `other`.
    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}
