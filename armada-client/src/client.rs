//! Client facade
//!
//! [`NetworkClient`] is the thread-safe surface the application drives:
//! blocking connect with deadline, non-blocking send/receive, orderly
//! disconnect, and connection-state queries. While connected, a dedicated
//! network thread owns the socket; everything crossing between the two
//! threads goes through the shared state in this module.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use armada_protocol::{AuthRoles, Message, RoleType, INVALID_PLAYER_ID};
use armada_utils::{ArmadaError, Result};

use crate::config::NetConfig;
use crate::connection::{self, Command};
use crate::discovery;
use crate::queue::MessageQueue;

/// State shared between the application thread and the network thread
pub(crate) struct ClientShared {
    state: Mutex<LinkState>,
    pub(crate) incoming: MessageQueue,
}

/// Everything guarded by the state lock
pub(crate) struct LinkState {
    /// The receive direction of the connection is usable
    pub(crate) rx_connected: bool,
    /// The transmit direction of the connection is usable
    pub(crate) tx_connected: bool,
    /// Post box into the network thread's loop, present while it runs
    pub(crate) worker: Option<mpsc::UnboundedSender<Command>>,
    destination: Option<String>,
    player_id: i32,
    host_player_id: i32,
    roles: AuthRoles,
}

impl ClientShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(LinkState {
                rx_connected: false,
                tx_connected: false,
                worker: None,
                destination: None,
                player_id: INVALID_PLAYER_ID,
                host_player_id: INVALID_PLAYER_ID,
                roles: AuthRoles::new(),
            }),
            incoming: MessageQueue::new(),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, LinkState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Client side of a game-server connection.
///
/// All operations are safe to call from the application thread while the
/// network thread runs concurrently. Connect calls block the caller until
/// success, failure, or deadline; everything else returns immediately.
///
/// The blocking calls drive a private event loop, so they must not be made
/// from inside an async runtime.
pub struct NetworkClient {
    shared: Arc<ClientShared>,
    config: NetConfig,
}

impl NetworkClient {
    /// Create a disconnected client with the given configuration
    pub fn new(config: NetConfig) -> Self {
        Self {
            shared: Arc::new(ClientShared::new()),
            config,
        }
    }

    /// Connect to the server at `address`. On failure, repeated attempts
    /// are made until `timeout` elapses
    /// ([`DEFAULT_CONNECT_TIMEOUT`](crate::DEFAULT_CONNECT_TIMEOUT) is the
    /// conventional choice). If `expect_timeout` is set, a timeout is not
    /// reported as an error.
    pub fn connect_to_server(
        &self,
        address: &str,
        timeout: Duration,
        expect_timeout: bool,
    ) -> bool {
        {
            let state = self.shared.state();
            if state.rx_connected && state.tx_connected {
                tracing::debug!("connect_to_server: already connected");
                return true;
            }
            if state.rx_connected || state.tx_connected {
                tracing::warn!("connect_to_server: previous connection still closing");
                return false;
            }
        }

        let start = Instant::now();
        match self.try_connect(address, timeout) {
            Ok(()) => {
                tracing::debug!(
                    "Connecting to server took {} ms",
                    start.elapsed().as_millis()
                );
                true
            }
            Err(e) => {
                if expect_timeout && matches!(e, ArmadaError::ConnectionTimeout { .. }) {
                    tracing::debug!("connect_to_server: {}", e);
                } else {
                    tracing::info!("Failed to connect to server at {}: {}", address, e);
                }
                false
            }
        }
    }

    /// Connect to a server on this machine
    pub fn connect_to_localhost(&self, timeout: Duration, expect_timeout: bool) -> bool {
        self.connect_to_server("127.0.0.1", timeout, expect_timeout)
    }

    /// Test whether a server at `address` is reachable: run the normal
    /// connect machinery, then tear the socket down instead of launching
    /// the network thread. Timeouts are expected and logged quietly.
    pub fn ping_server(&self, address: &str, timeout: Duration) -> bool {
        let runtime = match io_runtime() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("ping_server: {}", e);
                return false;
            }
        };

        match runtime.block_on(connection::establish(
            address,
            self.config.message_port,
            &self.config,
            timeout,
        )) {
            Ok(stream) => {
                drop(stream);
                true
            }
            Err(e) => {
                tracing::debug!("ping_server: {}", e);
                false
            }
        }
    }

    /// [`ping_server`](Self::ping_server) against the loopback address
    pub fn ping_localhost(&self, timeout: Duration) -> bool {
        self.ping_server("127.0.0.1", timeout)
    }

    fn try_connect(&self, address: &str, timeout: Duration) -> Result<()> {
        let runtime = io_runtime()?;
        let stream = runtime.block_on(connection::establish(
            address,
            self.config.message_port,
            &self.config,
            timeout,
        ))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        {
            let mut state = self.shared.state();
            state.rx_connected = true;
            state.tx_connected = true;
            state.worker = Some(command_tx);
            state.destination = Some(address.to_string());
        }

        // The socket was created under this runtime; both move to the
        // network thread together.
        if let Err(e) =
            connection::spawn_network_thread(Arc::clone(&self.shared), runtime, stream, command_rx)
        {
            let mut state = self.shared.state();
            state.rx_connected = false;
            state.tx_connected = false;
            state.worker = None;
            return Err(e);
        }
        Ok(())
    }

    /// Enqueue `message` for transmission. Returns immediately; the
    /// message is dropped with a log line if the transmit side is down.
    pub fn send(&self, message: Message) {
        let state = self.shared.state();
        if !state.tx_connected {
            tracing::error!("send: not transmit connected, dropping {}", message);
            return;
        }
        if let Some(worker) = &state.worker {
            tracing::trace!("sending message {}", message);
            // Failure means the network thread already exited; its cleanup
            // will flip the flags.
            let _ = worker.send(Command::Send(message));
        }
    }

    /// Deliver `message` to this client's own inbound queue without
    /// touching the network
    pub fn send_self(&self, message: Message) {
        tracing::trace!("self-delivering message {}", message);
        self.shared.incoming.push_back(message);
    }

    /// Next inbound message, if any; never blocks
    pub fn receive(&self) -> Option<Message> {
        let message = self.shared.incoming.pop_front();
        if let Some(message) = &message {
            tracing::trace!("received message {}", message);
        }
        message
    }

    /// Begin an orderly shutdown: pending sends drain, then the write
    /// half closes, then the peer's EOF closes the rest. No-op when
    /// already disconnected; calling it repeatedly is harmless.
    pub fn disconnect(&self) {
        let state = self.shared.state();
        if !state.rx_connected && !state.tx_connected {
            return;
        }
        if let Some(worker) = &state.worker {
            let _ = worker.send(Command::Disconnect);
        }
    }

    /// True when both directions of the connection are usable
    pub fn is_connected(&self) -> bool {
        let state = self.shared.state();
        state.rx_connected && state.tx_connected
    }

    /// True when the receive direction is usable
    pub fn is_rx_connected(&self) -> bool {
        self.shared.state().rx_connected
    }

    /// True when the transmit direction is usable
    pub fn is_tx_connected(&self) -> bool {
        self.shared.state().tx_connected
    }

    /// Address of the server this client last connected to
    pub fn destination(&self) -> Option<String> {
        self.shared.state().destination.clone()
    }

    /// Names of game servers answering a discovery broadcast on the local
    /// network. Only meaningful while connected; returns nothing otherwise.
    pub fn discover_lan_server_names(&self) -> Vec<String> {
        if !self.is_connected() {
            return Vec::new();
        }
        let runtime = match io_runtime() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("discover_lan_server_names: {}", e);
                return Vec::new();
            }
        };
        runtime
            .block_on(discovery::discover(discovery::broadcast_target(
                self.config.discovery_port,
            )))
            .into_iter()
            .map(|server| server.name)
            .collect()
    }

    // === Identity bookkeeping ===

    /// ID of the player on this client
    pub fn player_id(&self) -> i32 {
        self.shared.state().player_id
    }

    pub fn set_player_id(&self, player_id: i32) {
        tracing::debug!("player id set to {}", player_id);
        self.shared.state().player_id = player_id;
    }

    /// ID of the host player, or [`INVALID_PLAYER_ID`] when there is none
    pub fn host_player_id(&self) -> i32 {
        self.shared.state().host_player_id
    }

    pub fn set_host_player_id(&self, host_player_id: i32) {
        self.shared.state().host_player_id = host_player_id;
    }

    /// Whether `player_id` is the host
    pub fn player_is_host(&self, player_id: i32) -> bool {
        if player_id == INVALID_PLAYER_ID {
            return false;
        }
        player_id == self.shared.state().host_player_id
    }

    /// Check a granted authorization role
    pub fn has_auth_role(&self, role: RoleType) -> bool {
        self.shared.state().roles.has_role(role)
    }

    /// Replace the granted role set
    pub fn set_auth_roles(&self, roles: AuthRoles) {
        self.shared.state().roles = roles;
    }

    /// Grant or revoke a single role
    pub fn set_auth_role(&self, role: RoleType, granted: bool) {
        self.shared.state().roles.set_role(role, granted);
    }
}

impl Default for NetworkClient {
    fn default() -> Self {
        Self::new(NetConfig::default())
    }
}

fn io_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ArmadaError::internal(format!("Failed to build IO runtime: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_protocol::{Message, MessageKind};
    use bytes::BytesMut;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Instant;
    use tokio_util::codec::Encoder;

    fn client_for_port(port: u16) -> NetworkClient {
        NetworkClient::new(NetConfig {
            message_port: port,
            ..NetConfig::default()
        })
    }

    fn chat(body: &[u8]) -> Message {
        Message::new(MessageKind::CHAT, body.to_vec())
    }

    /// Read one `[kind][len][body]` frame off a blocking stream; `None` on EOF
    fn read_frame(stream: &mut TcpStream) -> Option<(u32, Vec<u8>)> {
        let mut header = [0u8; Message::HEADER_LEN];
        match stream.read_exact(&mut header) {
            Ok(()) => {}
            Err(_) => return None,
        }
        let kind = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).ok()?;
        Some((kind, body))
    }

    fn write_frame(stream: &mut TcpStream, message: Message) {
        let mut codec = armada_protocol::MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(message, &mut buf).unwrap();
        stream.write_all(&buf).unwrap();
    }

    fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_connect_and_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            // Drain until the client's FIN, then close our side too
            while read_frame(&mut stream).is_some() {}
        });

        let client = client_for_port(port);
        assert!(client.connect_to_server("127.0.0.1", Duration::from_secs(5), false));
        assert!(client.is_connected());
        assert!(client.is_rx_connected());
        assert!(client.is_tx_connected());
        assert_eq!(client.destination().as_deref(), Some("127.0.0.1"));

        client.disconnect();
        assert!(wait_until(Duration::from_secs(5), || !client.is_connected()));
        assert!(!client.is_rx_connected());
        assert!(!client.is_tx_connected());

        // Idempotent: repeated disconnects land in the same state
        client.disconnect();
        client.disconnect();
        assert!(!client.is_rx_connected());
        assert!(!client.is_tx_connected());

        server.join().unwrap();
    }

    #[test]
    fn test_connect_closed_port_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = client_for_port(port);
        let start = Instant::now();
        let connected = client.connect_to_server("127.0.0.1", Duration::from_millis(200), false);
        let elapsed = start.elapsed();

        assert!(!connected);
        assert!(!client.is_connected());
        assert!(elapsed >= Duration::from_millis(150), "too early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "hung: {:?}", elapsed);
    }

    #[test]
    fn test_connect_expect_timeout_still_returns_false() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = client_for_port(port);
        assert!(!client.connect_to_server("127.0.0.1", Duration::from_millis(100), true));
    }

    #[test]
    fn test_ping_server_does_not_stay_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            while read_frame(&mut stream).is_some() {}
        });

        let client = client_for_port(port);
        assert!(client.ping_server("127.0.0.1", Duration::from_secs(5)));
        assert!(!client.is_connected());

        server.join().unwrap();
    }

    #[test]
    fn test_send_receive_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut bodies = Vec::new();
            for _ in 0..3 {
                let (kind, body) = read_frame(&mut stream).unwrap();
                assert_eq!(kind, MessageKind::CHAT.as_u32());
                bodies.push(body);
            }
            write_frame(&mut stream, chat(b"pong"));
            while read_frame(&mut stream).is_some() {}
            bodies
        });

        let client = client_for_port(port);
        assert!(client.connect_to_server("127.0.0.1", Duration::from_secs(5), false));

        client.send(chat(b"a"));
        client.send(chat(b"bb"));
        client.send(chat(b"ccc"));

        assert!(wait_until(Duration::from_secs(5), || !client
            .shared
            .incoming
            .is_empty()));
        let reply = client.receive().unwrap();
        assert_eq!(reply.body(), b"pong");
        assert!(client.receive().is_none());

        client.disconnect();
        assert!(wait_until(Duration::from_secs(5), || !client.is_connected()));

        let bodies = server.join().unwrap();
        assert_eq!(bodies, vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);
    }

    #[test]
    fn test_disconnect_flushes_queued_message() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut frames = Vec::new();
            while let Some(frame) = read_frame(&mut stream) {
                frames.push(frame);
            }
            frames
        });

        let client = client_for_port(port);
        assert!(client.connect_to_server("127.0.0.1", Duration::from_secs(5), false));

        // Send then disconnect immediately: the queued message must still
        // go out ahead of the half-close.
        client.send(chat(b"last words"));
        client.disconnect();

        assert!(wait_until(Duration::from_secs(5), || !client.is_connected()));

        let frames = server.join().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].1, b"last words");
    }

    #[test]
    fn test_send_rejected_when_not_connected() {
        let client = NetworkClient::default();
        assert!(!client.is_tx_connected());
        // Dropped with a log line, no panic, nothing queued
        client.send(chat(b"into the void"));
        assert!(client.receive().is_none());
    }

    #[test]
    fn test_send_self_bypasses_network() {
        let client = NetworkClient::default();
        client.send_self(chat(b"note to self"));
        client.send_self(chat(b"second"));

        assert_eq!(client.receive().unwrap().body(), b"note to self");
        assert_eq!(client.receive().unwrap().body(), b"second");
        assert!(client.receive().is_none());
    }

    #[test]
    fn test_peer_close_flips_flags() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let client = client_for_port(port);
        assert!(client.connect_to_server("127.0.0.1", Duration::from_secs(5), false));

        server.join().unwrap();
        assert!(wait_until(Duration::from_secs(5), || !client.is_rx_connected()
            && !client.is_tx_connected()));
    }

    #[test]
    fn test_dropped_client_shuts_down_network_thread() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            // Blocks until the orphaned network thread half-closes
            read_frame(&mut stream).is_none()
        });

        let client = client_for_port(port);
        assert!(client.connect_to_server("127.0.0.1", Duration::from_secs(5), false));
        drop(client);

        assert!(server.join().unwrap());
    }

    #[test]
    fn test_identity_bookkeeping() {
        let client = NetworkClient::default();
        assert_eq!(client.player_id(), INVALID_PLAYER_ID);
        assert_eq!(client.host_player_id(), INVALID_PLAYER_ID);
        assert!(!client.player_is_host(INVALID_PLAYER_ID));

        client.set_player_id(3);
        client.set_host_player_id(3);
        assert_eq!(client.player_id(), 3);
        assert!(client.player_is_host(3));
        assert!(!client.player_is_host(4));

        assert!(!client.has_auth_role(RoleType::Host));
        client.set_auth_role(RoleType::Host, true);
        assert!(client.has_auth_role(RoleType::Host));

        let mut roles = AuthRoles::new();
        roles.set_role(RoleType::Observer, true);
        client.set_auth_roles(roles);
        assert!(client.has_auth_role(RoleType::Observer));
        assert!(!client.has_auth_role(RoleType::Host));
    }

    #[test]
    fn test_discovery_requires_connection() {
        let client = NetworkClient::default();
        assert!(client.discover_lan_server_names().is_empty());
    }
}
