pub mod aggregate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod history;
pub mod pipeline;
pub mod process;
pub mod run_id;
pub mod sanitize;
pub mod schema;
pub mod warehouse;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{IndexOutcome, Pipeline, PipelineResult};
pub use run_id::RunIdentity;
