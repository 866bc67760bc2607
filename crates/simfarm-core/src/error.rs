use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Failed to package job inputs: {0}")]
    Packaging(String),

    #[error("Transfer to or from worker failed: {0}")]
    Transfer(String),

    #[error("Could not create result directory {path}: {source}")]
    ResultDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker reported failure: {0}")]
    Remote(String),

    #[error("Result analysis failed: {0}")]
    Analysis(String),

    #[error("Invalid archive entry: {0}")]
    Archive(String),

    #[error("Job in invalid phase: expected {expected}, got {actual}")]
    InvalidPhase { expected: String, actual: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JobError>;
