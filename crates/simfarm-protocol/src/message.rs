use serde::{Deserialize, Serialize};

/// Message types on the manager/slave connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Hello = 1,
    Keepalive = 2,
    Payload = 3,
    Result = 4,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::Hello),
            2 => Some(MessageType::Keepalive),
            3 => Some(MessageType::Payload),
            4 => Some(MessageType::Result),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Slave registration; the payload is the raw UTF-8 slave name
    Hello(String),

    /// Idle-connection liveness signal, ignored by the slave
    Keepalive,

    /// Job archive sent to a slave
    Payload(PayloadFrame),

    /// Result archive sent back by a slave
    Result(ResultFrame),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello(_) => MessageType::Hello,
            Message::Keepalive => MessageType::Keepalive,
            Message::Payload(_) => MessageType::Payload,
            Message::Result(_) => MessageType::Result,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadFrame {
    pub job_name: String,
    pub archive: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFrame {
    pub job_name: String,
    /// Result bundle; empty when `error` is set
    pub archive: Vec<u8>,
    /// Set when the slave could not run the job
    pub error: Option<String>,
}

impl ResultFrame {
    pub fn success(job_name: impl Into<String>, archive: Vec<u8>) -> Self {
        ResultFrame {
            job_name: job_name.into(),
            archive,
            error: None,
        }
    }

    pub fn failure(job_name: impl Into<String>, error: impl Into<String>) -> Self {
        ResultFrame {
            job_name: job_name.into(),
            archive: Vec::new(),
            error: Some(error.into()),
        }
    }
}
