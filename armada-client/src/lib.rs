//! armada-client: persistent TCP client core
//!
//! Maintains a framed, full-duplex connection to a single game server. The
//! application thread talks to a [`NetworkClient`] facade; a dedicated
//! network thread owns the socket and runs the read/write loop, handing
//! decoded messages over through a mutex-guarded FIFO.

pub mod client;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod queue;

pub use client::NetworkClient;
pub use config::{NetConfig, DEFAULT_CONNECT_TIMEOUT};
pub use discovery::DiscoveredServer;
pub use queue::MessageQueue;
