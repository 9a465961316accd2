use thiserror::Error;

/// Outcomes that abort a run and map to a distinct process exit code.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("run {run_id}: no usable data for any index")]
    NoUsableData { run_id: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::NoUsableData { .. } => 1,
            PipelineError::Config(_) => 2,
        }
    }
}
