use chrono::{DateTime, NaiveDate, Utc};

use crate::sanitize::sanitize_column_name;
use crate::schema::{Column, TableSchema};

/// A coerced cell. There is no NaN: anything that could not be coerced is
/// `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    Float(f64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl TypedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Calendar date of a date or timestamp cell.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            TypedValue::Date(d) => Some(*d),
            TypedValue::Timestamp(ts) => Some(ts.date_naive()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One index's cleaned, typed rows. Column names are sanitized.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustedTable {
    /// Index name, e.g. `icc`.
    pub name: String,
    pub key_column: String,
    pub value_column: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<TypedValue>>,
}

impl TrustedTable {
    /// A table with the declared shape, names sanitized, and no rows.
    pub fn empty(name: &str, schema: &TableSchema) -> Self {
        Self {
            name: name.to_string(),
            key_column: sanitize_column_name(&schema.key_column),
            value_column: sanitize_column_name(&schema.value_column),
            columns: schema
                .columns
                .iter()
                .map(|c| Column {
                    name: sanitize_column_name(&c.name),
                    ..c.clone()
                })
                .collect(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Cell by column name; `None` when the column does not exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&TypedValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}
