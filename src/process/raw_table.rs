/// An untyped spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Missing,
    Text(String),
    Number(f64),
}

impl RawValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, RawValue::Missing)
    }

    /// Render the cell the way the raw layer stores it: everything as text.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Missing => None,
            RawValue::Text(s) => Some(s.clone()),
            RawValue::Number(n) => Some(n.to_string()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

/// A raw extract straight from the source sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Column labels as the sheet (or the positional declaration) names them.
    pub headers: Vec<String>,
    /// Each data row, one cell per header. Short rows are read as `Missing`.
    pub rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<RawValue>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == label)
    }

    /// Cell at (`row`, `col`), `Missing` when the row is short.
    pub fn cell(&self, row: usize, col: usize) -> &RawValue {
        static MISSING: RawValue = RawValue::Missing;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&MISSING)
    }
}
