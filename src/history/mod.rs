// src/history/mod.rs

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use glob::glob;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    collections::BTreeSet,
    fs::{self, File},
    path::PathBuf,
    sync::Arc,
};
use tracing::debug;

use crate::run_id::RunIdentity;
use crate::schema::{arrow::TIMESTAMP_TZ, timestamp_type};

pub const STARTED: &str = "started";
pub const REFINED: &str = "refined";
pub const FAILED: &str = "failed";

pub fn loaded(index: &str) -> String {
    format!("loaded-{}", index)
}

pub fn unavailable(index: &str) -> String {
    format!("unavailable-{}", index)
}

/// Append-only run log: one single-row Parquet file per event.
pub struct RunHistory {
    history_dir: PathBuf,
}

impl RunHistory {
    /// Open the log at `history_dir`, creating the directory if needed.
    pub fn new(history_dir: impl Into<PathBuf>) -> Result<Self> {
        let history_dir = history_dir.into();
        fs::create_dir_all(&history_dir)
            .with_context(|| format!("creating history directory {:?}", &history_dir))?;
        Ok(Self { history_dir })
    }

    /// Writes `<run>_<event>_<ts>.parquet` with columns
    /// run_id, event, detail, event_time.
    pub fn record_event(&self, run: &RunIdentity, event: &str, detail: &str) -> Result<()> {
        let ts = Utc::now().timestamp_micros();
        let filename = format!("{}_{}_{}.parquet", run.short(), event, ts);
        let path = self.history_dir.join(filename);

        let schema = Arc::new(Schema::new(vec![
            Field::new("run_id", DataType::Utf8, false),
            Field::new("event", DataType::Utf8, false),
            Field::new("detail", DataType::Utf8, false),
            Field::new("event_time", timestamp_type(), false),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![run.full()])),
            Arc::new(StringArray::from(vec![event.to_string()])),
            Arc::new(StringArray::from(vec![detail.to_string()])),
            Arc::new(TimestampMicrosecondArray::from_iter_values(vec![ts]).with_timezone(TIMESTAMP_TZ)),
        ];
        let batch =
            RecordBatch::try_new(schema.clone(), columns).context("building history record batch")?;

        let file =
            File::create(&path).with_context(|| format!("creating history file {:?}", &path))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))
            .context("creating Arrow writer for history")?;
        writer.write(&batch).context("writing history batch")?;
        writer.close().context("closing history writer")?;
        debug!(run_id = %run, event, "history event recorded");
        Ok(())
    }

    /// Short run ids that recorded exactly `event`, from file names alone.
    pub fn load_event_names(&self, event: &str) -> Result<BTreeSet<String>> {
        let mut set = BTreeSet::new();
        let pattern = format!("{}/*_{}_*.parquet", self.history_dir.display(), event);
        for path in glob(&pattern)?.flatten() {
            if let Some(run) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|stem| parse_event_stem(stem, event))
            {
                set.insert(run.to_string());
            }
        }
        Ok(set)
    }

    /// Every run that ever started.
    pub fn list_runs(&self) -> Result<BTreeSet<String>> {
        self.load_event_names(STARTED)
    }

    /// Runs that started but neither refined nor failed.
    pub fn unfinished_runs(&self) -> Result<BTreeSet<String>> {
        let refined = self.load_event_names(REFINED)?;
        let failed = self.load_event_names(FAILED)?;
        Ok(self
            .list_runs()?
            .into_iter()
            .filter(|r| !refined.contains(r) && !failed.contains(r))
            .collect())
    }
}

/// `<run>_<event>_<ts>` → `<run>` when the event matches and `ts` is numeric.
fn parse_event_stem<'a>(stem: &'a str, event: &str) -> Option<&'a str> {
    let (run, rest) = stem.split_once('_')?;
    let (found, ts) = rest.rsplit_once('_')?;
    if found != event || ts.is_empty() || !ts.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(run)
}
