//! Framed message type
//!
//! A [`Message`] is a small fixed header (kind tag + body length) followed
//! by an opaque byte body. Body semantics belong to the layer above; this
//! crate only guarantees framing.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::codec::CodecError;

/// Tag identifying what a message body contains.
///
/// Stored as a raw `u32` on the wire. Unknown tags decode fine; the codec
/// never rejects a kind, only a bad length. Well-known values are provided
/// as constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MessageKind(pub u32);

impl MessageKind {
    /// Keepalive / reachability probe
    pub const PING: MessageKind = MessageKind(1);
    /// Join request carrying player identity
    pub const JOIN: MessageKind = MessageKind(2);
    /// Player chat text
    pub const CHAT: MessageKind = MessageKind(3);
    /// Server-to-client turn state
    pub const TURN_UPDATE: MessageKind = MessageKind(4);
    /// Client-to-server orders for the current turn
    pub const TURN_ORDERS: MessageKind = MessageKind(5);
    /// Orderly session end notice
    pub const SHUTDOWN: MessageKind = MessageKind(6);

    /// Raw wire value of this kind
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for MessageKind {
    fn from(raw: u32) -> Self {
        MessageKind(raw)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::PING => write!(f, "ping"),
            Self::JOIN => write!(f, "join"),
            Self::CHAT => write!(f, "chat"),
            Self::TURN_UPDATE => write!(f, "turn-update"),
            Self::TURN_ORDERS => write!(f, "turn-orders"),
            Self::SHUTDOWN => write!(f, "shutdown"),
            MessageKind(raw) => write!(f, "kind#{}", raw),
        }
    }
}

/// A single framed message: kind tag plus opaque body bytes.
///
/// Messages are immutable once built; the body length recorded in the wire
/// header always equals `body().len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    body: Bytes,
}

impl Message {
    /// Wire header size: kind (u32) + body length (u32), big endian
    pub const HEADER_LEN: usize = 8;

    /// Create a message from a kind and body bytes
    pub fn new(kind: MessageKind, body: impl Into<Bytes>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    /// Create a bodyless message
    pub fn empty(kind: MessageKind) -> Self {
        Self {
            kind,
            body: Bytes::new(),
        }
    }

    /// Create a message whose body is the bincode serialization of `payload`
    pub fn with_payload<T: Serialize>(kind: MessageKind, payload: &T) -> Result<Self, CodecError> {
        let body = bincode::serialize(payload)?;
        Ok(Self {
            kind,
            body: Bytes::from(body),
        })
    }

    /// Deserialize the body as a bincode payload of type `T`
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        Ok(bincode::deserialize(&self.body)?)
    }

    /// The message kind tag
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The opaque body bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body length in bytes
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// True when the body is empty
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub(crate) fn into_parts(self) -> (MessageKind, Bytes) {
        (self.kind, self.body)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} bytes)", self.kind, self.body.len())
    }
}
