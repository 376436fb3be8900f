use rmcore::engine::error::EngineError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Restraint engine error: {0}")]
    Core(#[from] EngineError),

    #[error("Invalid run configuration: {0}")]
    Config(String),

    #[error("Failed to parse run file '{path}': {source}", path = path.display())]
    RunFile {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid --set override '{key}': {reason}")]
    InvalidOverride { key: String, reason: String },

    #[error("Failed to format the evaluation report: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("Failed to write report '{path}': {source}", path = path.display())]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to install logger: {0}")]
    Logging(String),

    #[error("Failed to build the global thread pool: {0}")]
    ThreadPool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),
}
