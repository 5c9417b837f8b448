//! Validated SQL identifiers.

use crate::error::ConfigError;
use std::fmt;

/// Longest identifier PostgreSQL keeps without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

/// A table (or database) name that is safe to splice into SQL.
///
/// Only `[A-Za-z_][A-Za-z0-9_]*` is accepted, and [`TableName::quoted`]
/// always wraps the name in double quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    /// Validate `raw` as an identifier. `field` names the config entry for
    /// error reporting.
    pub fn parse(field: &str, raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut chars = raw.chars();
        match chars.next() {
            None => return Err(invalid("must not be empty")),
            Some(first) if !(first.is_ascii_alphabetic() || first == '_') => {
                return Err(invalid("must start with a letter or underscore"));
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid("may only contain letters, digits and underscores"));
        }
        if raw.len() > MAX_IDENTIFIER_LEN {
            return Err(invalid("must be at most 63 characters"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier as a double-quoted SQL identifier.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
