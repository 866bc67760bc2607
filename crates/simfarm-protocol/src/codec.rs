use crate::{Message, MessageType, PayloadFrame, ProtocolError, Result, ResultFrame, MAX_MESSAGE_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Codec for encoding/decoding messages with length-prefixed framing
///
/// Frame format: [4-byte length (big-endian)] [1-byte message type] [payload]
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    max_message_size: usize,
}

impl MessageCodec {
    pub fn new(max_message_size: usize) -> Self {
        MessageCodec { max_message_size }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        MessageCodec::new(MAX_MESSAGE_SIZE)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        // Need at least 5 bytes for length prefix + message type
        if src.len() < 5 {
            return Ok(None);
        }

        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[0..4]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge(length));
        }
        if length == 0 {
            return Err(ProtocolError::Protocol("empty frame".to_string()));
        }

        // Wait for complete message
        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);

        let msg_type_byte = src.get_u8();
        let msg_type = MessageType::from_u8(msg_type_byte)
            .ok_or(ProtocolError::InvalidMessageType(msg_type_byte))?;

        let payload = src.split_to(length - 1);

        let message = match msg_type {
            MessageType::Hello => Message::Hello(String::from_utf8(payload.to_vec())?),
            MessageType::Keepalive => Message::Keepalive,
            MessageType::Payload => {
                let frame: PayloadFrame = bincode::deserialize(&payload)?;
                Message::Payload(frame)
            }
            MessageType::Result => {
                let frame: ResultFrame = bincode::deserialize(&payload)?;
                Message::Result(frame)
            }
        };

        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let payload = match &item {
            Message::Hello(name) => name.as_bytes().to_vec(),
            Message::Keepalive => Vec::new(),
            Message::Payload(frame) => bincode::serialize(frame)?,
            Message::Result(frame) => bincode::serialize(frame)?,
        };

        let total_length = 1 + payload.len();
        if total_length > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge(total_length));
        }

        dst.reserve(4 + total_length);
        dst.put_u32(total_length as u32);
        dst.put_u8(item.message_type().as_u8());
        dst.put_slice(&payload);

        Ok(())
    }
}
