use econ_indices::{
    fetch::{HttpDownloader, XlsxSource},
    history::RunHistory,
    warehouse::ParquetWarehouse,
    Pipeline, PipelineConfig, PipelineError,
};
use std::{env, process::ExitCode, time::Instant};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {:#}", e);
            return ExitCode::from(2);
        }
    };
    info!(
        warehouse = %config.warehouse_dir.display(),
        indices = config.indices.len(),
        "configuration loaded"
    );

    // ─── 3) run ──────────────────────────────────────────────────────
    let start = Instant::now();
    match run(&config) {
        Ok(summary) => {
            info!(elapsed = ?start.elapsed(), "done: {}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("pipeline failed: {:#}", e);
            let code = e
                .downcast_ref::<PipelineError>()
                .map(PipelineError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

/// Wire production collaborators, run once, return a JSON summary.
fn run(config: &PipelineConfig) -> anyhow::Result<String> {
    let source = XlsxSource::new(HttpDownloader::new(config)?);
    let warehouse = ParquetWarehouse::new(&config.warehouse_dir)?;
    let history = RunHistory::new(config.warehouse_dir.join("_history"))?;

    let result = Pipeline::new(config, &source, &warehouse)
        .with_history(&history)
        .run()?;
    Ok(serde_json::to_string(&result)?)
}
