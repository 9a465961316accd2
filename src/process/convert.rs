use crate::aggregate::RefinedTable;
use crate::process::raw_table::RawTable;
use crate::process::typed_table::{TrustedTable, TypedValue};
use crate::process::utils;
use crate::sanitize::sanitize_column_name;
use crate::schema::{build_arrow_schema, timestamp_type, Column, SemanticType};
use anyhow::{Context, Result};
use arrow::{
    array::{
        ArrayRef, Date32Builder, Float64Builder, StringBuilder, TimestampMicrosecondBuilder,
    },
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::sync::Arc;

pub const LOAD_TIMESTAMP: &str = "load_timestamp";
pub const RUN_ID: &str = "run_id";
pub const YEAR_MONTH: &str = "year_month";

/// Days from 0001-01-01 (CE) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn date_to_days(d: NaiveDate) -> i32 {
    d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn load_timestamp_column(len: usize, ts: DateTime<Utc>) -> ArrayRef {
    let mut b = TimestampMicrosecondBuilder::with_capacity(len);
    for _ in 0..len {
        b.append_value(ts.timestamp_micros());
    }
    Arc::new(b.finish().with_timezone(crate::schema::arrow::TIMESTAMP_TZ)) as ArrayRef
}

fn load_timestamp_field() -> Field {
    Field::new(LOAD_TIMESTAMP, timestamp_type(), false)
}

/// Raw layer: every cell as text under sanitized, de-duplicated headers,
/// plus `load_timestamp`. A header named like the stamp column is suffixed.
pub fn raw_to_batch(raw: &RawTable, load_timestamp: DateTime<Utc>) -> Result<RecordBatch> {
    let reserved = std::iter::once(LOAD_TIMESTAMP.to_string());
    let mut names =
        utils::unique_names(reserved.chain(raw.headers.iter().map(|h| sanitize_column_name(h))));
    names.remove(0);

    let mut fields: Vec<Field> = names
        .iter()
        .map(|n| Field::new(n, DataType::Utf8, true))
        .collect();
    fields.push(load_timestamp_field());

    let mut out = Vec::with_capacity(fields.len());
    for col in 0..names.len() {
        let mut b = StringBuilder::new();
        for row in 0..raw.len() {
            b.append_option(raw.cell(row, col).as_text());
        }
        out.push(Arc::new(b.finish()) as ArrayRef);
    }
    out.push(load_timestamp_column(raw.len(), load_timestamp));

    RecordBatch::try_new(Arc::new(Schema::new(fields)), out).context("building raw batch")
}

/// Trusted layer: declared types, plus `load_timestamp`.
pub fn trusted_to_batch(table: &TrustedTable, load_timestamp: DateTime<Utc>) -> Result<RecordBatch> {
    let schema = build_arrow_schema(&table.columns, vec![load_timestamp_field()]);

    static NULL: TypedValue = TypedValue::Null;
    let mut out = Vec::with_capacity(table.columns.len() + 1);
    for (idx, col) in table.columns.iter().enumerate() {
        let cells = table.rows.iter().map(|r| r.get(idx).unwrap_or(&NULL));
        out.push(typed_column(col, cells));
    }
    out.push(load_timestamp_column(table.len(), load_timestamp));

    RecordBatch::try_new(schema, out)
        .with_context(|| format!("building trusted batch for {}", table.name))
}

/// Build one Arrow column; cells of the wrong variant are written as null.
fn typed_column<'a>(col: &Column, cells: impl Iterator<Item = &'a TypedValue>) -> ArrayRef {
    match col.ty {
        SemanticType::Float64 => {
            let mut b = Float64Builder::new();
            for v in cells {
                b.append_option(v.as_f64());
            }
            Arc::new(b.finish()) as ArrayRef
        }
        SemanticType::Date => {
            let mut b = Date32Builder::new();
            for v in cells {
                b.append_option(match v {
                    TypedValue::Date(d) => Some(date_to_days(*d)),
                    _ => None,
                });
            }
            Arc::new(b.finish()) as ArrayRef
        }
        SemanticType::Timestamp => {
            let mut b = TimestampMicrosecondBuilder::new();
            for v in cells {
                b.append_option(match v {
                    TypedValue::Timestamp(ts) => Some(ts.timestamp_micros()),
                    _ => None,
                });
            }
            Arc::new(b.finish().with_timezone(crate::schema::arrow::TIMESTAMP_TZ)) as ArrayRef
        }
        SemanticType::String => {
            let mut b = StringBuilder::new();
            for v in cells {
                b.append_option(v.as_str());
            }
            Arc::new(b.finish()) as ArrayRef
        }
    }
}

/// Refined layer: `year_month`, `<index>_index` / `<index>_variation` per
/// index, `load_timestamp`, `run_id`.
pub fn refined_to_batch(table: &RefinedTable) -> Result<RecordBatch> {
    let mut fields = vec![Field::new(YEAR_MONTH, DataType::Utf8, false)];
    for index in &table.indices {
        fields.push(Field::new(format!("{}_index", index), DataType::Float64, true));
        fields.push(Field::new(format!("{}_variation", index), DataType::Float64, true));
    }
    fields.push(load_timestamp_field());
    fields.push(Field::new(RUN_ID, DataType::Utf8, false));

    let mut out: Vec<ArrayRef> = Vec::with_capacity(fields.len());

    let mut periods = StringBuilder::new();
    for row in &table.rows {
        periods.append_value(row.year_month.to_string());
    }
    out.push(Arc::new(periods.finish()));

    for pos in 0..table.indices.len() {
        let mut values = Float64Builder::new();
        let mut variations = Float64Builder::new();
        for row in &table.rows {
            let point = row.points.get(pos).copied().unwrap_or_default();
            values.append_option(point.value);
            variations.append_option(point.variation);
        }
        out.push(Arc::new(values.finish()));
        out.push(Arc::new(variations.finish()));
    }

    let mut stamps = TimestampMicrosecondBuilder::new();
    let mut runs = StringBuilder::new();
    for row in &table.rows {
        stamps.append_value(row.load_timestamp.timestamp_micros());
        runs.append_value(row.run_id.full());
    }
    out.push(Arc::new(
        stamps.finish().with_timezone(crate::schema::arrow::TIMESTAMP_TZ),
    ));
    out.push(Arc::new(runs.finish()));

    RecordBatch::try_new(Arc::new(Schema::new(fields)), out).context("building refined batch")
}
