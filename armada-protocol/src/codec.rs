//! Message codec for TCP framing
//!
//! Wire layout per message: `[kind: u32 BE][body_len: u32 BE][body bytes]`.
//! The declared body length is untrusted input and is validated against
//! [`MAX_MESSAGE_SIZE`] before any allocation happens.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::message::{Message, MessageKind};

/// Maximum message body size (16 MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Codec framing [`Message`]s on a byte stream, both directions
pub struct MessageCodec;

impl MessageCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need the full fixed-size header first
        if src.len() < Message::HEADER_LEN {
            return Ok(None);
        }

        // Peek at the header without consuming
        let kind = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;

        // Validate the declared length before sizing any buffer
        if len > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            });
        }

        // Check if we have the full body
        if src.len() < Message::HEADER_LEN + len {
            src.reserve(Message::HEADER_LEN + len - src.len());
            return Ok(None);
        }

        // Consume header, then body
        src.advance(Message::HEADER_LEN);
        let body = src.split_to(len).freeze();

        Ok(Some(Message::new(MessageKind::from(kind), body)))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge {
                size: item.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let (kind, body) = item.into_parts();
        dst.reserve(Message::HEADER_LEN + body.len());
        dst.put_u32(kind.as_u32());
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}
