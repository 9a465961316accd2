use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::process::raw_table::{RawTable, RawValue};
use crate::process::typed_table::{TrustedTable, TypedValue};
use crate::sanitize::{sanitize_column_name, sanitize_scalar};
use crate::schema::{Column, InvalidPolicy, SemanticType, TableSchema};

/// What one Raw→Trusted load did to the data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    /// Rows whose key column did not parse.
    pub rows_dropped: usize,
    /// Invalid cells replaced by 0.0 (zero-policy columns).
    pub zero_filled: usize,
    /// Invalid or missing cells left null.
    pub null_filled: usize,
    /// Declared columns absent from the raw headers.
    pub missing_columns: Vec<String>,
}

/// Raw → Trusted.
///
/// - keeps only declared columns, renamed through `sanitize_column_name`
/// - coerces every cell to the declared type
/// - drops rows whose key column does not parse (reported, not fatal)
/// - invalid float64 cells become 0.0 or null per column policy
/// - preserves row order
#[tracing::instrument(level = "info", skip(raw, schema), fields(rows = raw.len()))]
pub fn load(name: &str, raw: &RawTable, schema: &TableSchema) -> Result<(TrustedTable, LoadReport)> {
    let columns: Vec<Column> = schema
        .columns
        .iter()
        .map(|c| Column {
            name: sanitize_column_name(&c.name),
            ty: c.ty,
            on_invalid: c.on_invalid,
        })
        .collect();
    let key_column = sanitize_column_name(&schema.key_column);
    let value_column = sanitize_column_name(&schema.value_column);

    let key_pos = match columns.iter().position(|c| c.name == key_column) {
        Some(pos) => pos,
        None => bail!("{}: key column `{}` is not declared", name, schema.key_column),
    };
    if !columns.iter().any(|c| c.name == value_column) {
        bail!("{}: value column `{}` is not declared", name, schema.value_column);
    }

    // sanitized raw label → raw position; first occurrence wins
    let mut by_label: HashMap<String, usize> = HashMap::new();
    for (i, header) in raw.headers.iter().enumerate() {
        by_label.entry(sanitize_column_name(header)).or_insert(i);
    }

    let mut report = LoadReport {
        rows_read: raw.len(),
        ..Default::default()
    };
    let sources: Vec<Option<usize>> = columns
        .iter()
        .map(|c| {
            let pos = by_label.get(&c.name).copied();
            if pos.is_none() {
                warn!(index = %name, column = %c.name, "declared column missing from raw headers");
                report.missing_columns.push(c.name.clone());
            }
            pos
        })
        .collect();

    let mut rows = Vec::with_capacity(raw.len());
    for row_idx in 0..raw.len() {
        let key_cell = cell_at(raw, row_idx, sources[key_pos]);
        let key = sanitize_scalar(key_cell, columns[key_pos].ty);
        if key.is_null() {
            debug!(index = %name, row = row_idx, cell = ?key_cell, "dropping row with unparseable key");
            report.rows_dropped += 1;
            continue;
        }

        let mut out = Vec::with_capacity(columns.len());
        for (col, src) in columns.iter().zip(&sources) {
            let value = match sanitize_scalar(cell_at(raw, row_idx, *src), col.ty) {
                TypedValue::Null => substitute(col, &mut report),
                v => v,
            };
            out.push(value);
        }
        rows.push(out);
    }
    report.rows_kept = rows.len();

    if report.rows_dropped > 0 {
        warn!(
            index = %name,
            dropped = report.rows_dropped,
            key = %key_column,
            "rows dropped for unparseable key column"
        );
    }
    info!(
        index = %name,
        kept = report.rows_kept,
        zero_filled = report.zero_filled,
        null_filled = report.null_filled,
        "raw → trusted"
    );

    let table = TrustedTable {
        name: name.to_string(),
        key_column,
        value_column,
        columns,
        rows,
    };
    Ok((table, report))
}

fn cell_at(raw: &RawTable, row: usize, col: Option<usize>) -> &RawValue {
    static MISSING: RawValue = RawValue::Missing;
    match col {
        Some(c) => raw.cell(row, c),
        None => &MISSING,
    }
}

fn substitute(col: &Column, report: &mut LoadReport) -> TypedValue {
    match (col.ty, col.on_invalid) {
        (SemanticType::Float64, InvalidPolicy::Zero) => {
            report.zero_filled += 1;
            TypedValue::Float(0.0)
        }
        _ => {
            report.null_filled += 1;
            TypedValue::Null
        }
    }
}
