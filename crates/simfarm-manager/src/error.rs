use simfarm_protocol::ProtocolError;
use thiserror::Error;

/// Reasons a long-running loop (or the manager around it) stops
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("Handshake failed: {0}")]
    Handshake(#[from] ProtocolError),

    #[error("Connection closed before the worker identified itself")]
    HandshakeClosed,

    #[error("Expected a hello frame, got {0}")]
    UnexpectedFrame(String),

    #[error("Keepalive to worker {worker} failed: {source}")]
    Keepalive {
        worker: String,
        #[source]
        source: ProtocolError,
    },

    #[error("Queue closed")]
    QueueClosed,

    #[error("Queue full")]
    QueueFull,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
