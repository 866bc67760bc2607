use simfarm_core::JobError;
use simfarm_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlaveError {
    #[error("Could not connect to manager at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unexpected {0} frame from manager")]
    UnexpectedFrame(String),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Runner failed: {0}")]
    Runner(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SlaveError>;
