mod message;
mod codec;

pub use message::{Message, MessageType, PayloadFrame, ResultFrame};
pub use codec::MessageCodec;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Worker name is not valid UTF-8")]
    InvalidName(#[from] std::string::FromUtf8Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Default maximum frame size: 512MB (simulation bundles can be large)
pub const MAX_MESSAGE_SIZE: usize = 512 * 1024 * 1024;
