//! Trusted → Refined: monthly grouping, outer join of the indices and
//! month-over-month percent variation.

pub mod period;

pub use period::PeriodKey;

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::process::typed_table::{TrustedTable, TypedValue};
use crate::run_id::RunIdentity;

/// One index's value for a period and its change against the previous month.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndexPoint {
    pub value: Option<f64>,
    pub variation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefinedRow {
    pub year_month: PeriodKey,
    /// One point per index, in `RefinedTable::indices` order.
    pub points: Vec<IndexPoint>,
    pub load_timestamp: DateTime<Utc>,
    pub run_id: RunIdentity,
}

/// The analytics-ready output of one run, sorted by `year_month`.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedTable {
    pub indices: Vec<String>,
    pub rows: Vec<RefinedRow>,
}

impl RefinedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Point for `index` in row `row`.
    pub fn point(&self, row: usize, index: &str) -> Option<IndexPoint> {
        let pos = self.indices.iter().position(|i| i == index)?;
        self.rows.get(row).and_then(|r| r.points.get(pos)).copied()
    }

    pub fn find(&self, year_month: &str) -> Option<&RefinedRow> {
        self.rows
            .iter()
            .find(|r| r.year_month.to_string() == year_month)
    }
}

/// `(current - previous) / previous * 100`, or `None` when either side is
/// missing or `previous` is zero.
pub fn percent_variation(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (current, previous) {
        (Some(cur), Some(prev)) if prev != 0.0 => {
            Some((cur - prev) / prev * 100.0).filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// Period → headline value of one trusted table. Later rows win on
/// duplicate periods; a null value still occupies its period.
fn monthly_series(table: &TrustedTable) -> BTreeMap<PeriodKey, Option<f64>> {
    let mut series = BTreeMap::new();
    let key_idx = table.column_index(&table.key_column);
    let value_idx = table.column_index(&table.value_column);

    for row in &table.rows {
        let date = key_idx
            .and_then(|i| row.get(i))
            .and_then(TypedValue::as_date);
        let Some(date) = date else {
            continue;
        };
        let value = value_idx.and_then(|i| row.get(i)).and_then(TypedValue::as_f64);
        if let Some(prev) = series.insert(PeriodKey::from_date(date), value) {
            debug!(index = %table.name, period = %PeriodKey::from_date(date), replaced = ?prev, "duplicate period, keeping later row");
        }
    }
    series
}

/// Merge any number of trusted index tables into one refined table.
#[tracing::instrument(level = "info", skip(tables, load_timestamp), fields(run_id = %run))]
pub fn aggregate_all(
    tables: &[&TrustedTable],
    run: &RunIdentity,
    load_timestamp: DateTime<Utc>,
) -> RefinedTable {
    let series: Vec<BTreeMap<PeriodKey, Option<f64>>> =
        tables.iter().map(|t| monthly_series(t)).collect();
    let periods: BTreeSet<PeriodKey> = series.iter().flat_map(|s| s.keys().copied()).collect();

    let rows: Vec<RefinedRow> = periods
        .into_iter()
        .map(|period| {
            let points = series
                .iter()
                .map(|s| {
                    let value = s.get(&period).copied().flatten();
                    let previous = s.get(&period.previous()).copied().flatten();
                    IndexPoint {
                        value,
                        variation: percent_variation(value, previous),
                    }
                })
                .collect();
            RefinedRow {
                year_month: period,
                points,
                load_timestamp,
                run_id: *run,
            }
        })
        .collect();

    info!(periods = rows.len(), indices = tables.len(), "trusted → refined");
    RefinedTable {
        indices: tables.iter().map(|t| t.name.clone()).collect(),
        rows,
    }
}

/// ICC + ICF → refined, stamped with the current time.
pub fn aggregate(icc: &TrustedTable, icf: &TrustedTable, run: &RunIdentity) -> RefinedTable {
    aggregate_all(&[icc, icf], run, Utc::now())
}
