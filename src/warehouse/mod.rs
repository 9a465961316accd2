// src/warehouse/mod.rs

//! Persist collaborator: datasets of named, write-once tables.

pub mod memory;
pub mod local;

pub use self::memory::MemoryWarehouse;
pub use self::local::ParquetWarehouse;

use anyhow::Result;
use arrow::record_batch::RecordBatch;

pub trait Warehouse {
    /// Create `dataset` if it does not exist yet.
    fn ensure_dataset(&self, dataset: &str) -> Result<()>;

    /// Store `batch` as `dataset.table`. Fails if the table already exists.
    fn write_table(&self, dataset: &str, table: &str, batch: &RecordBatch) -> Result<()>;
}
