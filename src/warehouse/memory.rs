use anyhow::{bail, Result};
use arrow::record_batch::RecordBatch;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::Warehouse;

/// In-process warehouse keyed by `(dataset, table)`.
#[derive(Default)]
pub struct MemoryWarehouse {
    datasets: Mutex<BTreeSet<String>>,
    tables: Mutex<BTreeMap<(String, String), RecordBatch>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dataset: &str, table: &str) -> Option<RecordBatch> {
        self.tables
            .lock()
            .unwrap()
            .get(&(dataset.to_string(), table.to_string()))
            .cloned()
    }

    /// Every stored `(dataset, table)` pair, sorted.
    pub fn tables(&self) -> Vec<(String, String)> {
        self.tables.lock().unwrap().keys().cloned().collect()
    }

    pub fn datasets(&self) -> Vec<String> {
        self.datasets.lock().unwrap().iter().cloned().collect()
    }
}

impl Warehouse for MemoryWarehouse {
    fn ensure_dataset(&self, dataset: &str) -> Result<()> {
        self.datasets.lock().unwrap().insert(dataset.to_string());
        Ok(())
    }

    fn write_table(&self, dataset: &str, table: &str, batch: &RecordBatch) -> Result<()> {
        let key = (dataset.to_string(), table.to_string());
        let mut tables = self.tables.lock().unwrap();
        if tables.contains_key(&key) {
            bail!("table {}.{} already exists", dataset, table);
        }
        tables.insert(key, batch.clone());
        Ok(())
    }
}
