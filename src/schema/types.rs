// src/schema/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// The semantic type a declared column is coerced to.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Float64,
    Date,
    Timestamp,
    String,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Float64 => "float64",
            SemanticType::Date => "date",
            SemanticType::Timestamp => "timestamp",
            SemanticType::String => "string",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an invalid or missing float64 cell turns into.
///
/// `Zero` is meant for primary measured quantities, where a visible 0 is
/// auditable; `Null` for optional breakdowns, so they never bias averages.
/// Non-numeric columns always fall back to null.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvalidPolicy {
    Zero,
    #[default]
    Null,
}

/// A single declared column.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: SemanticType,
    #[serde(default)]
    pub on_invalid: InvalidPolicy,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: SemanticType) -> Self {
        Self {
            name: name.into(),
            ty,
            on_invalid: InvalidPolicy::Null,
        }
    }

    pub fn with_policy(mut self, policy: InvalidPolicy) -> Self {
        self.on_invalid = policy;
        self
    }
}

/// Declared shape of one index sheet.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TableSchema {
    /// Column every row must parse to keep the row (the reference date).
    pub key_column: String,
    /// The index's headline quantity, carried into the refined layer.
    pub value_column: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}
