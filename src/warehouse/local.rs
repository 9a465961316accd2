use anyhow::{bail, Context, Result};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use super::Warehouse;

/// Local warehouse: `<root>/<dataset>/<table>.parquet`.
pub struct ParquetWarehouse {
    root: PathBuf,
}

impl ParquetWarehouse {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating warehouse directory {:?}", &root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self, dataset: &str, table: &str) -> PathBuf {
        self.root.join(dataset).join(format!("{}.parquet", table))
    }

    /// Read a whole table back as one batch per row group.
    pub fn read_table(&self, dataset: &str, table: &str) -> Result<Vec<RecordBatch>> {
        let path = self.table_path(dataset, table);
        let file = File::open(&path).with_context(|| format!("opening {:?}", &path))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("reading parquet metadata of {:?}", &path))?
            .build()?;
        reader
            .map(|b| b.with_context(|| format!("reading batch from {:?}", &path)))
            .collect()
    }

    /// Tables of `dataset`, sorted by name.
    pub fn tables(&self, dataset: &str) -> Result<Vec<String>> {
        let dir = self.root.join(dataset);
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("listing {:?}", &dir))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl Warehouse for ParquetWarehouse {
    fn ensure_dataset(&self, dataset: &str) -> Result<()> {
        let dir = self.root.join(dataset);
        fs::create_dir_all(&dir).with_context(|| format!("creating dataset {:?}", &dir))?;
        debug!(dataset, "dataset ready");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, batch), fields(rows = batch.num_rows()))]
    fn write_table(&self, dataset: &str, table: &str, batch: &RecordBatch) -> Result<()> {
        let final_path = self.table_path(dataset, table);
        if final_path.exists() {
            bail!("table {}.{} already exists at {:?}", dataset, table, final_path);
        }
        if let Some(dir) = final_path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;
        }

        let tmp = final_path.with_extension("parquet.tmp");
        if let Err(e) = write_parquet(&tmp, batch) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        publish(&tmp, &final_path)
            .with_context(|| format!("table {}.{} not published", dataset, table))?;

        info!(dataset, table, rows = batch.num_rows(), path = %final_path.display(), "table written");
        Ok(())
    }
}

fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
        .context("creating Arrow writer")?;
    writer.write(batch).context("writing batch")?;
    writer.close().context("closing Arrow writer")?;
    Ok(())
}

/// Move `tmp` to `final_path`, failing if `final_path` exists. A hard link
/// never replaces its target, unlike `rename`. `tmp` is gone either way.
fn publish(tmp: &Path, final_path: &Path) -> Result<()> {
    let linked = fs::hard_link(tmp, final_path)
        .with_context(|| format!("linking {:?} to {:?}", tmp, final_path));
    if let Err(e) = fs::remove_file(tmp) {
        warn!(path = %tmp.display(), "failed to remove temporary file: {}", e);
    }
    linked
}
