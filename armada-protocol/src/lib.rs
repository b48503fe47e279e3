//! armada-protocol: Shared wire definitions for client-server communication
//!
//! This crate defines the framed message format exchanged between an armada
//! client and server over TCP, plus the identity types (player ids, auth
//! roles) and the LAN discovery datagram constants.

pub mod codec;
pub mod message;
pub mod types;

// Re-export main types at crate root
pub use codec::{CodecError, MessageCodec, MAX_MESSAGE_SIZE};
pub use message::{Message, MessageKind};
pub use types::{AuthRoles, RoleType, INVALID_PLAYER_ID};

/// Well-known TCP port game servers listen on
pub const MESSAGE_PORT: u16 = 12346;

/// Well-known UDP port used for LAN server discovery
pub const DISCOVERY_PORT: u16 = 12345;

/// Datagram broadcast by clients looking for servers on the local network
pub const DISCOVERY_QUESTION: &str = "armada-discovery: any servers out there?";

/// Prefix of the datagram servers answer with; the server name follows it
pub const DISCOVERY_ANSWER: &str = "armada-server:";
