// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::error::PipelineError;
use crate::process::convert::LOAD_TIMESTAMP;
use crate::sanitize::sanitize_column_name;
use crate::schema::{SemanticType, TableSchema};

/// Built-in index declarations, used when `PIPELINE_CONFIG` is unset.
pub const DEFAULT_CONFIG: &str = include_str!("../config/indices.yaml");

fn default_prefix() -> String {
    "economic_indices".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// One economic index: where to fetch it and how to read and type it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
    /// Short identifier, also used in table names (`icc`, `icf`).
    pub name: String,
    /// Page that links to the spreadsheet.
    pub source_url: String,
    /// Direct spreadsheet URL; skips scraping `source_url` when set.
    #[serde(default)]
    pub download_url: Option<String>,
    pub sheet: String,
    /// Leading rows to skip before the header row.
    #[serde(default)]
    pub skip_rows: usize,
    /// Cap on data rows read below the header.
    #[serde(default)]
    pub max_rows: Option<usize>,
    /// Replace the sheet's header row by the declared column names, in order.
    #[serde(default = "default_true")]
    pub positional_headers: bool,
    #[serde(flatten)]
    pub schema: TableSchema,
}

/// Everything a run needs; built once in `main` and passed by reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub warehouse_dir: PathBuf,
    pub download_dir: PathBuf,
    #[serde(default = "default_prefix")]
    pub dataset_prefix: String,
    #[serde(default = "default_timeout")]
    pub http_timeout_secs: u64,
    pub indices: Vec<IndexConfig>,
}

impl PipelineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_yaml::from_str(yaml).context("parsing pipeline configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// `PIPELINE_CONFIG` (or the built-in document), then `WAREHOUSE_DIR` /
    /// `DOWNLOAD_DIR` overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var("PIPELINE_CONFIG") {
            Ok(path) if !path.is_empty() => {
                info!(path = %path, "loading configuration");
                Self::from_path(&path)?
            }
            _ => Self::from_yaml_str(DEFAULT_CONFIG)?,
        };
        if let Ok(dir) = env::var("WAREHOUSE_DIR") {
            config.warehouse_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn index(&self, name: &str) -> Option<&IndexConfig> {
        self.indices.iter().find(|i| i.name == name)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.indices.is_empty() {
            return Err(PipelineError::Config("no indices declared".into()));
        }
        if self.dataset_prefix.is_empty()
            || sanitize_column_name(&self.dataset_prefix) != self.dataset_prefix
        {
            return Err(PipelineError::Config(format!(
                "dataset_prefix `{}` is not a lowercase identifier",
                self.dataset_prefix
            )));
        }

        let mut names = HashSet::new();
        for index in &self.indices {
            if sanitize_column_name(&index.name) != index.name {
                return Err(PipelineError::Config(format!(
                    "index name `{}` is not a lowercase identifier",
                    index.name
                )));
            }
            if !names.insert(index.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "index `{}` declared twice",
                    index.name
                )));
            }
            for url in std::iter::once(&index.source_url).chain(index.download_url.as_ref()) {
                url::Url::parse(url).map_err(|e| {
                    PipelineError::Config(format!("{}: bad url `{}`: {}", index.name, url, e))
                })?;
            }

            let schema = &index.schema;
            if schema.columns.is_empty() {
                return Err(PipelineError::Config(format!(
                    "{}: no columns declared",
                    index.name
                )));
            }
            for (role, column) in [("key", &schema.key_column), ("value", &schema.value_column)] {
                if schema.column(column).is_none() {
                    return Err(PipelineError::Config(format!(
                        "{}: {} column `{}` is not declared",
                        index.name, role, column
                    )));
                }
            }
            if let Some(key) = schema.column(&schema.key_column) {
                if !matches!(key.ty, SemanticType::Date | SemanticType::Timestamp) {
                    return Err(PipelineError::Config(format!(
                        "{}: key column `{}` must be date or timestamp, not {}",
                        index.name, key.name, key.ty
                    )));
                }
            }
            if let Some(value) = schema.column(&schema.value_column) {
                if value.ty != SemanticType::Float64 {
                    return Err(PipelineError::Config(format!(
                        "{}: value column `{}` must be float64, not {}",
                        index.name, value.name, value.ty
                    )));
                }
            }

            let mut sanitized = HashSet::new();
            for column in &schema.columns {
                let name = sanitize_column_name(&column.name);
                if name == LOAD_TIMESTAMP {
                    return Err(PipelineError::Config(format!(
                        "{}: column `{}` clashes with the reserved `{}` column",
                        index.name, column.name, LOAD_TIMESTAMP
                    )));
                }
                if !sanitized.insert(name.clone()) {
                    return Err(PipelineError::Config(format!(
                        "{}: more than one column sanitizes to `{}`",
                        index.name, name
                    )));
                }
            }
        }
        Ok(())
    }
}
