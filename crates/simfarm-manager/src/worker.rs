use crate::error::{DispatchError, Result};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use simfarm_protocol::{Message, MessageCodec, PayloadFrame, ProtocolError, ResultFrame};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use uuid::Uuid;

/// Any bidirectional byte stream a worker can be reached over
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Connection for T {}

pub type WorkerId = Uuid;

/// A registered worker and its long-lived connection.
///
/// Ownership is the busy/idle marker: whoever holds the handle has exclusive
/// use of the connection. The pool holds idle handles.
pub struct WorkerHandle {
    id: WorkerId,
    name: String,
    registered_at: DateTime<Utc>,
    conn: Framed<Box<dyn Connection>, MessageCodec>,
}

impl WorkerHandle {
    /// Read the worker's hello frame from a freshly accepted connection.
    pub async fn handshake<S: Connection>(stream: S, codec: MessageCodec) -> Result<Self> {
        let mut conn = Framed::new(Box::new(stream) as Box<dyn Connection>, codec);

        let name = match conn.next().await {
            Some(Ok(Message::Hello(name))) => name,
            Some(Ok(other)) => {
                return Err(DispatchError::UnexpectedFrame(format!(
                    "{:?}",
                    other.message_type()
                )))
            }
            Some(Err(e)) => return Err(DispatchError::Handshake(e)),
            None => return Err(DispatchError::HandshakeClosed),
        };

        Ok(WorkerHandle {
            id: Uuid::new_v4(),
            name,
            registered_at: Utc::now(),
            conn,
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Self-reported name; not necessarily unique
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub async fn send_keepalive(&mut self) -> std::result::Result<(), ProtocolError> {
        self.conn.send(Message::Keepalive).await
    }

    pub async fn send_payload(
        &mut self,
        job_name: &str,
        archive: Vec<u8>,
    ) -> std::result::Result<(), ProtocolError> {
        self.conn
            .send(Message::Payload(PayloadFrame {
                job_name: job_name.to_string(),
                archive,
            }))
            .await
    }

    /// Wait for the worker's result frame.
    pub async fn recv_result(&mut self) -> std::result::Result<ResultFrame, ProtocolError> {
        match self.conn.next().await {
            Some(Ok(Message::Result(frame))) => Ok(frame),
            Some(Ok(other)) => Err(ProtocolError::Protocol(format!(
                "expected a result frame, got {:?}",
                other.message_type()
            ))),
            Some(Err(e)) => Err(e),
            None => Err(ProtocolError::Protocol(
                "connection closed while waiting for result".to_string(),
            )),
        }
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}
