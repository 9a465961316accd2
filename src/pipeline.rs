// src/pipeline.rs

//! One run: fetch → Raw → Trusted per index, then Refined.

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::aggregate::aggregate_all;
use crate::config::{IndexConfig, PipelineConfig};
use crate::error::PipelineError;
use crate::fetch::SpreadsheetSource;
use crate::history::{self, RunHistory};
use crate::process::convert::{raw_to_batch, refined_to_batch, trusted_to_batch};
use crate::process::{load, LoadReport, RawTable, TrustedTable};
use crate::run_id::{Layer, RunIdentity};
use crate::warehouse::Warehouse;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    Loaded(LoadReport),
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: RunIdentity,
    pub load_timestamp: DateTime<Utc>,
    /// Per index, in configuration order.
    pub outcomes: Vec<(String, IndexOutcome)>,
    pub refined_rows: usize,
    /// Every table written, as `dataset.table`.
    pub tables: Vec<String>,
}

impl PipelineResult {
    /// Some index was unavailable but the run still produced output.
    pub fn is_partial(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, o)| matches!(o, IndexOutcome::Unavailable { .. }))
    }

    pub fn outcome(&self, index: &str) -> Option<&IndexOutcome> {
        self.outcomes.iter().find(|(n, _)| n == index).map(|(_, o)| o)
    }
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    source: &'a dyn SpreadsheetSource,
    warehouse: &'a dyn Warehouse,
    history: Option<&'a RunHistory>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        source: &'a dyn SpreadsheetSource,
        warehouse: &'a dyn Warehouse,
    ) -> Self {
        Self {
            config,
            source,
            warehouse,
            history: None,
        }
    }

    pub fn with_history(mut self, history: &'a RunHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Fresh run identity, one load timestamp for every layer.
    pub fn run(&self) -> Result<PipelineResult> {
        self.run_as(RunIdentity::new(), Utc::now())
    }

    #[tracing::instrument(level = "info", skip(self, run, load_timestamp), fields(run_id = %run))]
    pub fn run_as(&self, run: RunIdentity, load_timestamp: DateTime<Utc>) -> Result<PipelineResult> {
        let start = Instant::now();
        self.record(&run, history::STARTED, &load_timestamp.to_rfc3339());

        let result = self.execute(run, load_timestamp);
        match &result {
            Ok(res) => info!(
                refined_rows = res.refined_rows,
                tables = res.tables.len(),
                partial = res.is_partial(),
                elapsed = ?start.elapsed(),
                "run finished"
            ),
            Err(e) => {
                error!("run failed: {:#}", e);
                self.record(&run, history::FAILED, &format!("{:#}", e));
            }
        }
        result
    }

    fn execute(&self, run: RunIdentity, load_timestamp: DateTime<Utc>) -> Result<PipelineResult> {
        let prefix = &self.config.dataset_prefix;
        let raw_ds = run.dataset_name(prefix, Layer::Raw);
        let trusted_ds = run.dataset_name(prefix, Layer::Trusted);
        let refined_ds = run.dataset_name(prefix, Layer::Refined);
        for ds in [&raw_ds, &trusted_ds, &refined_ds] {
            self.warehouse
                .ensure_dataset(ds)
                .with_context(|| format!("creating dataset {}", ds))?;
        }

        let mut tables = Vec::new();
        let mut outcomes = Vec::with_capacity(self.config.indices.len());
        let mut trusted = Vec::with_capacity(self.config.indices.len());

        for index in &self.config.indices {
            let (raw, unavailable) = match self.fetch(index) {
                Ok(raw) => (raw, None),
                Err(reason) => {
                    warn!(index = %index.name, "index unavailable: {}", reason);
                    self.record(&run, &history::unavailable(&index.name), &reason);
                    (RawTable::default(), Some(reason))
                }
            };

            if unavailable.is_none() {
                let raw_table = run.table_name(Layer::Raw, Some(&index.name));
                self.write(&raw_ds, &raw_table, raw_to_batch(&raw, load_timestamp)?)?;
                tables.push(format!("{}.{}", raw_ds, raw_table));
            }

            let (table, report) = load(&index.name, &raw, &index.schema)?;
            let trusted_table = run.table_name(Layer::Trusted, Some(&index.name));
            self.write(&trusted_ds, &trusted_table, trusted_to_batch(&table, load_timestamp)?)?;
            tables.push(format!("{}.{}", trusted_ds, trusted_table));

            let outcome = match unavailable {
                Some(reason) => IndexOutcome::Unavailable { reason },
                None => {
                    self.record(
                        &run,
                        &history::loaded(&index.name),
                        &format!("kept={} dropped={}", report.rows_kept, report.rows_dropped),
                    );
                    IndexOutcome::Loaded(report)
                }
            };
            outcomes.push((index.name.clone(), outcome));
            trusted.push(table);
        }

        let inputs: Vec<&TrustedTable> = trusted.iter().collect();
        let refined = aggregate_all(&inputs, &run, load_timestamp);
        if refined.is_empty() {
            return Err(PipelineError::NoUsableData {
                run_id: run.full(),
            }
            .into());
        }

        let refined_table = run.table_name(Layer::Refined, None);
        self.write(&refined_ds, &refined_table, refined_to_batch(&refined)?)?;
        tables.push(format!("{}.{}", refined_ds, refined_table));
        self.record(&run, history::REFINED, &format!("{}.{}", refined_ds, refined_table));

        Ok(PipelineResult {
            run_id: run,
            load_timestamp,
            outcomes,
            refined_rows: refined.len(),
            tables,
        })
    }

    /// Source failures and empty sheets become a reason string.
    fn fetch(&self, index: &IndexConfig) -> Result<RawTable, String> {
        match self.source.fetch(index) {
            Ok(raw) if raw.is_empty() => Err("sheet has no data rows".to_string()),
            Ok(raw) => Ok(raw),
            Err(e) => Err(format!("{:#}", e)),
        }
    }

    fn write(&self, dataset: &str, table: &str, batch: RecordBatch) -> Result<()> {
        self.warehouse
            .write_table(dataset, table, &batch)
            .with_context(|| format!("writing {}.{}", dataset, table))
    }

    fn record(&self, run: &RunIdentity, event: &str, detail: &str) {
        if let Some(history) = self.history {
            if let Err(e) = history.record_event(run, event, detail) {
                warn!(event, "failed to record history event: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONFIG;
    use crate::process::convert::{RUN_ID, YEAR_MONTH};
    use crate::process::RawValue;
    use crate::test_support::init_test_logging;
    use crate::warehouse::{MemoryWarehouse, ParquetWarehouse};
    use anyhow::bail;
    use arrow::array::{Array, Float64Array, StringArray};
    use std::collections::HashMap;
    use tempfile::tempdir;

    /// Serves canned raw tables; anything else is "unavailable".
    #[derive(Default)]
    struct FakeSource {
        tables: HashMap<String, RawTable>,
    }

    impl FakeSource {
        fn with(mut self, index: &str, rows: &[(&str, f64)]) -> Self {
            let mut raw = RawTable::new(vec!["Mês".into(), index.to_uppercase()]);
            for (date, value) in rows {
                raw.push_row(vec![RawValue::from(*date), RawValue::from(*value)]);
            }
            self.tables.insert(index.to_string(), raw);
            self
        }
    }

    impl SpreadsheetSource for FakeSource {
        fn fetch(&self, index: &IndexConfig) -> Result<RawTable> {
            match self.tables.get(&index.name) {
                Some(raw) => Ok(raw.clone()),
                None => bail!("{} download failed", index.name),
            }
        }
    }

    struct ReadOnlyWarehouse;

    impl Warehouse for ReadOnlyWarehouse {
        fn ensure_dataset(&self, _dataset: &str) -> Result<()> {
            Ok(())
        }

        fn write_table(&self, _dataset: &str, _table: &str, _batch: &RecordBatch) -> Result<()> {
            bail!("permission denied")
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::from_yaml_str(DEFAULT_CONFIG).unwrap()
    }

    fn float_column<'b>(batch: &'b RecordBatch, name: &str) -> &'b Float64Array {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
    }

    fn string_column<'b>(batch: &'b RecordBatch, name: &str) -> &'b StringArray {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
    }

    #[test]
    fn one_index_unavailable_is_partial_success() -> Result<()> {
        init_test_logging();
        let config = config();
        let source = FakeSource::default().with("icc", &[("2024-01-01", 100.0), ("2024-02-01", 110.0)]);
        let warehouse = MemoryWarehouse::new();

        let result = Pipeline::new(&config, &source, &warehouse).run()?;
        assert!(result.is_partial());
        assert_eq!(result.refined_rows, 2);
        assert!(matches!(result.outcome("icc"), Some(IndexOutcome::Loaded(r)) if r.rows_kept == 2));
        assert!(matches!(result.outcome("icf"), Some(IndexOutcome::Unavailable { .. })));

        let run = result.run_id;
        let prefix = &config.dataset_prefix;
        assert_eq!(warehouse.datasets().len(), 3);
        assert!(warehouse
            .get(&run.dataset_name(prefix, Layer::Raw), &run.table_name(Layer::Raw, Some("icc")))
            .is_some());
        assert!(warehouse
            .get(&run.dataset_name(prefix, Layer::Raw), &run.table_name(Layer::Raw, Some("icf")))
            .is_none());
        // the unavailable index still goes through the loader: empty, same columns
        let trusted_icf = warehouse
            .get(&run.dataset_name(prefix, Layer::Trusted), &run.table_name(Layer::Trusted, Some("icf")))
            .expect("empty trusted table written");
        assert_eq!(trusted_icf.num_rows(), 0);
        assert_eq!(trusted_icf.num_columns(), config.index("icf").unwrap().schema.columns.len() + 1);
        assert!(trusted_icf.column_by_name("mes").is_some());

        let refined = warehouse
            .get(&run.dataset_name(prefix, Layer::Refined), &run.table_name(Layer::Refined, None))
            .expect("refined table written");
        assert_eq!(refined.num_rows(), 2);
        assert_eq!(string_column(&refined, YEAR_MONTH).value(1), "2024-02");

        let variation = float_column(&refined, "icc_variation");
        assert!(variation.is_null(0));
        assert!((variation.value(1) - 10.0).abs() < 1e-9);
        let icf = float_column(&refined, "icf_index");
        assert!(icf.is_null(0) && icf.is_null(1));
        let ids = string_column(&refined, RUN_ID);
        assert_eq!(ids.value(0), run.full());
        assert_eq!(ids.value(1), run.full());
        Ok(())
    }

    #[test]
    fn no_usable_data_fails_the_run() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let config = config();
        let run_log = RunHistory::new(dir.path())?;
        let source = FakeSource::default();
        let warehouse = MemoryWarehouse::new();

        let run = RunIdentity::new();
        let err = Pipeline::new(&config, &source, &warehouse)
            .with_history(&run_log)
            .run_as(run, Utc::now())
            .unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(e @ PipelineError::NoUsableData { .. }) => assert_eq!(e.exit_code(), 1),
            other => panic!("unexpected error: {:?}", other),
        }
        let tables = warehouse.tables();
        assert_eq!(tables.len(), 2);
        assert!(tables.iter().all(|(_, t)| t.starts_with("trusted_")));
        assert!(run_log.load_event_names(history::FAILED)?.contains(&run.short()));
        assert!(run_log
            .load_event_names(&history::unavailable("icc"))?
            .contains(&run.short()));
        Ok(())
    }

    #[test]
    fn rows_without_dates_do_not_count_as_data() {
        let config = config();
        let source = FakeSource::default().with("icc", &[("total", 1.0)]);
        let warehouse = MemoryWarehouse::new();
        let err = Pipeline::new(&config, &source, &warehouse).run().unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().is_some());
    }

    #[test]
    fn rows_kept_but_not_aggregatable_fail_the_run() {
        // a text key keeps every row in trusted but gives refined no periods
        let mut config = config();
        for index in config.indices.iter_mut() {
            index.schema.columns[0].ty = crate::schema::SemanticType::String;
        }
        let source = FakeSource::default()
            .with("icc", &[("2024-01-01", 100.0), ("2024-02-01", 110.0)])
            .with("icf", &[("2024-01-01", 90.0)]);
        let warehouse = MemoryWarehouse::new();

        let err = Pipeline::new(&config, &source, &warehouse).run().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoUsableData { .. })
        ));
        assert!(warehouse
            .tables()
            .iter()
            .all(|(_, t)| !t.starts_with("refined_")));
    }

    #[test]
    fn two_runs_never_overwrite_each_other() -> Result<()> {
        let config = config();
        let source = FakeSource::default()
            .with("icc", &[("2024-01-01", 100.0)])
            .with("icf", &[("2024-01-01", 90.0)]);
        let warehouse = MemoryWarehouse::new();
        let pipeline = Pipeline::new(&config, &source, &warehouse);

        let first = pipeline.run()?;
        let second = pipeline.run()?;
        assert_ne!(first.run_id, second.run_id);
        assert!(!first.is_partial());

        let refined: Vec<_> = warehouse
            .tables()
            .into_iter()
            .filter(|(_, t)| t.starts_with("refined_"))
            .collect();
        assert_eq!(refined.len(), 2);
        // raw + trusted for both indices, plus refined, per run
        assert_eq!(warehouse.tables().len(), 10);
        Ok(())
    }

    #[test]
    fn warehouse_failure_is_fatal() {
        let config = config();
        let source = FakeSource::default().with("icc", &[("2024-01-01", 100.0)]);
        let err = Pipeline::new(&config, &source, &ReadOnlyWarehouse)
            .run()
            .unwrap_err();
        assert!(format!("{:#}", err).contains("permission denied"));
        assert!(err.downcast_ref::<PipelineError>().is_none());
    }

    #[test]
    fn writes_parquet_layers_and_history() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let config = config();
        let warehouse = ParquetWarehouse::new(dir.path().join("warehouse"))?;
        let run_log = RunHistory::new(dir.path().join("warehouse/_history"))?;
        let source = FakeSource::default()
            .with("icc", &[("2024-01-01", 100.0), ("2024-02-01", 0.0), ("2024-03-01", 50.0)])
            .with("icf", &[("2024-02-01", 80.0), ("2024-03-01", 88.0)]);

        let result = Pipeline::new(&config, &source, &warehouse)
            .with_history(&run_log)
            .run()?;
        let run = result.run_id;
        assert_eq!(result.tables.len(), 5);

        let refined_ds = run.dataset_name(&config.dataset_prefix, Layer::Refined);
        let batches = warehouse.read_table(&refined_ds, &run.table_name(Layer::Refined, None))?;
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 3);

        // a zero previous month gives no variation
        let icc = float_column(batch, "icc_variation");
        assert!((icc.value(1) + 100.0).abs() < 1e-9);
        assert!(icc.is_null(2));
        let icf = float_column(batch, "icf_variation");
        assert!(icf.is_null(0) && icf.is_null(1));
        assert!((icf.value(2) - 10.0).abs() < 1e-9);

        let trusted_ds = run.dataset_name(&config.dataset_prefix, Layer::Trusted);
        assert_eq!(
            warehouse.tables(&trusted_ds)?,
            vec![
                run.table_name(Layer::Trusted, Some("icc")),
                run.table_name(Layer::Trusted, Some("icf")),
            ]
        );
        assert_eq!(run_log.list_runs()?.len(), 1);
        assert!(run_log.unfinished_runs()?.is_empty());
        Ok(())
    }
}
