use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::Timelike;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::process::{RawTable, RawValue};
use crate::sanitize::sanitize_column_name;

/// Read the configured sheet of a workbook into a raw table.
#[tracing::instrument(level = "info", skip(path, index), fields(path = %path.as_ref().display(), index = %index.name))]
pub fn read_sheet<P: AsRef<Path>>(path: P, index: &IndexConfig) -> Result<RawTable> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {:?}", path))?;

    let names = workbook.sheet_names().to_vec();
    let sheet = pick_sheet(&names, &index.sheet)
        .with_context(|| format!("workbook {:?} has no sheets", path))?;
    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("Failed to read sheet {:?} of {:?}", sheet, path))?;

    let (height, width) = range.get_size();
    debug!(sheet = %sheet, height, width, "sheet size");

    let rows = range
        .rows()
        .map(|r| r.iter().map(cell_to_raw).collect::<Vec<_>>());
    let table = table_from_rows(rows, index);
    info!(sheet = %sheet, rows = table.len(), columns = table.headers.len(), "sheet read");
    Ok(table)
}

/// Exact name, then a case/accent-insensitive match, then the first sheet.
pub fn pick_sheet(names: &[String], wanted: &str) -> Option<String> {
    if let Some(exact) = names.iter().find(|n| n.as_str() == wanted) {
        return Some(exact.clone());
    }
    let folded = sanitize_column_name(wanted);
    if let Some(close) = names.iter().find(|n| sanitize_column_name(n) == folded) {
        return Some(close.clone());
    }
    let first = names.first()?;
    warn!(wanted, using = %first, "sheet not found, using first sheet");
    Some(first.clone())
}

pub fn cell_to_raw(cell: &Data) -> RawValue {
    match cell {
        Data::String(s) if s.trim().is_empty() => RawValue::Missing,
        Data::String(s) => RawValue::Text(s.clone()),
        Data::Float(f) => RawValue::Number(*f),
        Data::Int(i) => RawValue::Number(*i as f64),
        Data::Bool(b) => RawValue::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) if ndt.time().num_seconds_from_midnight() == 0 => {
                RawValue::Text(ndt.format("%Y-%m-%d").to_string())
            }
            Some(ndt) => RawValue::Text(ndt.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => RawValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawValue::Text(s.clone()),
        Data::Error(_) | Data::Empty => RawValue::Missing,
    }
}

/// Shape sheet rows into a raw table:
/// skip `skip_rows`, take the header row, read up to `max_rows` rows below
/// it and drop the blank ones. With `positional_headers` the declared column
/// names replace the header and rows are cut to the declared width.
pub fn table_from_rows<I>(rows: I, index: &IndexConfig) -> RawTable
where
    I: IntoIterator<Item = Vec<RawValue>>,
{
    let mut rows = rows.into_iter().skip(index.skip_rows);
    let header = rows.next();

    let headers: Vec<String> = if index.positional_headers {
        index.schema.columns.iter().map(|c| c.name.clone()).collect()
    } else {
        header
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, cell)| cell.as_text().unwrap_or_else(|| format!("column_{}", i)))
            .collect()
    };

    let limit = index.max_rows.unwrap_or(usize::MAX);
    let mut table = RawTable::new(headers);
    let mut blank = 0usize;
    for mut row in rows.take(limit) {
        if row.iter().all(RawValue::is_missing) {
            blank += 1;
            continue;
        }
        if index.positional_headers {
            row.truncate(table.headers.len());
        }
        table.push_row(row);
    }
    if blank > 0 {
        debug!(blank, "skipped blank rows");
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, DEFAULT_CONFIG};

    fn icc() -> IndexConfig {
        PipelineConfig::from_yaml_str(DEFAULT_CONFIG)
            .unwrap()
            .index("icc")
            .unwrap()
            .clone()
    }

    fn sheet() -> Vec<Vec<RawValue>> {
        vec![
            vec!["Índice de Confiança do Consumidor".into()],
            vec!["Mês".into(), "ICC".into()],
            vec!["jan/24".into(), 100.0.into(), "extra".into()],
            vec![RawValue::Missing, RawValue::Missing],
            vec!["fev/24".into(), 110.0.into()],
            vec!["mar/24".into(), 120.0.into()],
        ]
    }

    #[test]
    fn positional_headers_replace_sheet_header() {
        let mut index = icc();
        index.max_rows = Some(3);
        let table = table_from_rows(sheet(), &index);

        assert_eq!(table.headers.len(), 22);
        assert_eq!(table.headers[0], "mes");
        assert_eq!(table.headers[1], "icc");
        // the row cap counts the blank row
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].len(), 3);
        assert_eq!(table.cell(1, 0), &RawValue::from("fev/24"));
    }

    #[test]
    fn sheet_header_used_when_not_positional() {
        let mut index = icc();
        index.positional_headers = false;
        index.max_rows = None;
        let table = table_from_rows(sheet(), &index);

        assert_eq!(table.headers, vec!["Mês", "ICC"]);
        assert_eq!(table.len(), 3);
        // extra cells are kept; the loader only reads declared columns
        assert_eq!(table.rows[0].len(), 3);
    }

    #[test]
    fn truncates_to_declared_width() {
        let mut index = icc();
        index.schema.columns.truncate(2);
        let table = table_from_rows(sheet(), &index);
        assert_eq!(table.rows[0], vec![RawValue::from("jan/24"), RawValue::from(100.0)]);
    }

    #[test]
    fn empty_sheet_gives_empty_table() {
        let table = table_from_rows(Vec::new(), &icc());
        assert!(table.is_empty());
    }

    #[test]
    fn sheet_lookup_ignores_case_and_accents() {
        let names = vec!["Capa".to_string(), "Serie Historica".to_string()];
        assert_eq!(
            pick_sheet(&names, "Série Histórica").as_deref(),
            Some("Serie Historica")
        );
        assert_eq!(pick_sheet(&names, "Capa").as_deref(), Some("Capa"));
        assert_eq!(pick_sheet(&names, "Outra").as_deref(), Some("Capa"));
        assert_eq!(pick_sheet(&[], "Outra"), None);
    }

    #[test]
    fn cells_map_to_raw_values() {
        assert_eq!(cell_to_raw(&Data::Empty), RawValue::Missing);
        assert_eq!(cell_to_raw(&Data::String("  ".into())), RawValue::Missing);
        assert_eq!(cell_to_raw(&Data::Int(3)), RawValue::Number(3.0));
        assert_eq!(cell_to_raw(&Data::Float(98.2)), RawValue::Number(98.2));
        assert_eq!(
            cell_to_raw(&Data::String("jan/24".into())),
            RawValue::from("jan/24")
        );
    }
}
