//! Field name to column name mapping.
//!
//! Column names cannot be bound as statement parameters, so every name that
//! ends up in SQL text goes through [`ColumnName`], which only ever holds
//! characters from `[A-Za-z0-9-]` and is always emitted double-quoted.

use crate::stats_store::{PCID_COLUMN, UPDATED_COLUMN};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use thiserror::Error;

lazy_static! {
    static ref COLUMN_NAME_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9-]+$").expect("column name pattern is valid");
}

const RESERVED_COLUMNS: &[&str] = &[PCID_COLUMN, UPDATED_COLUMN];

/// Reasons a report field cannot be mapped to a column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("field name {raw:?} has no usable characters")]
    Empty { raw: String },

    #[error("field name {raw:?} maps to reserved column {name}")]
    Reserved { raw: String, name: String },

    #[error("field name {raw:?} collides with another field mapped to {name}")]
    Duplicate { raw: String, name: String },

    #[error("{0:?} is not a valid column name")]
    Invalid(String),
}

impl IdentifierError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            IdentifierError::Empty { .. } => "empty",
            IdentifierError::Reserved { .. } => "reserved",
            IdentifierError::Duplicate { .. } => "duplicate",
            IdentifierError::Invalid(_) => "invalid",
        }
    }
}

/// Keeps only `[A-Za-z0-9-]`, preserving the order of the kept characters.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

/// A column name that is safe to splice into SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnName(String);

impl ColumnName {
    /// Maps a raw report field name to a column name.
    ///
    /// Names that sanitize to nothing, or to one of the fixed columns, are
    /// rejected rather than renamed.
    pub fn from_field(raw: &str) -> Result<Self, IdentifierError> {
        let sanitized = sanitize(raw);
        if sanitized.is_empty() {
            return Err(IdentifierError::Empty {
                raw: raw.to_string(),
            });
        }
        if let Some(reserved) = RESERVED_COLUMNS
            .iter()
            .find(|reserved| reserved.eq_ignore_ascii_case(&sanitized))
        {
            return Err(IdentifierError::Reserved {
                raw: raw.to_string(),
                name: reserved.to_string(),
            });
        }
        Self::new(sanitized)
    }

    /// Wraps a name that is expected to be clean already, such as one read
    /// back from the table definition.
    pub fn new(name: impl Into<String>) -> Result<Self, IdentifierError> {
        let name = name.into();
        if COLUMN_NAME_PATTERN.is_match(&name) {
            Ok(Self(name))
        } else {
            Err(IdentifierError::Invalid(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SQLite compares column names case-insensitively.
    pub fn key(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
