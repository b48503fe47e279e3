//! Network thread and duplex I/O loop
//!
//! One dedicated thread owns the connected socket and a current-thread
//! runtime. The loop multiplexes the framed read chain with a command
//! channel fed by the facade; exactly one read and one write are ever in
//! flight, so the socket needs no locking of its own.
//!
//! Shutdown, from either side, proceeds in order: stop accepting sends,
//! drain the outbound queue, half-close the write direction, wait for the
//! peer's EOF, then exit.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use armada_protocol::{CodecError, Message, MessageCodec};
use armada_utils::Result;

use crate::client::ClientShared;

/// Work items posted into the network thread's loop by the facade
#[derive(Debug)]
pub(crate) enum Command {
    /// Append a message to the outbound queue
    Send(Message),
    /// Begin the shutdown protocol
    Disconnect,
}

/// Spawn the network thread, handing it the runtime the socket was
/// created under. The thread keeps its own reference to the shared state
/// so the facade cannot be freed out from under it.
pub(crate) fn spawn_network_thread(
    shared: Arc<ClientShared>,
    runtime: Runtime,
    stream: TcpStream,
    commands: mpsc::UnboundedReceiver<Command>,
) -> Result<()> {
    std::thread::Builder::new()
        .name("armada-net".into())
        .spawn(move || {
            let framed = Framed::new(stream, MessageCodec::new());
            runtime.block_on(run(&shared, framed, commands));

            let mut state = shared.state();
            state.rx_connected = false;
            state.tx_connected = false;
            state.worker = None;
            drop(state);
            tracing::trace!("network thread terminated");
        })
        .map_err(armada_utils::ArmadaError::from)?;
    Ok(())
}

async fn run(
    shared: &Arc<ClientShared>,
    mut framed: Framed<TcpStream, MessageCodec>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut outgoing: VecDeque<Message> = VecDeque::new();
    // Set once shutdown begins: no further sends are accepted, pending
    // writes drain, then the write half closes.
    let mut draining = false;
    let mut write_closed = false;
    // Wakes the loop on idle connections so the orphan check below runs
    let mut liveness = tokio::time::interval(Duration::from_secs(1));
    liveness.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    'io: loop {
        // The facade is the only other holder of the shared state; when it
        // is gone nobody can consume or disconnect us, so shut down now
        // instead of leaking the thread.
        if !draining && Arc::strong_count(shared) < 2 {
            tracing::debug!("client handle dropped, network thread shutting down");
            draining = true;
            shared.state().tx_connected = false;
        }

        if draining && !write_closed && outgoing.is_empty() {
            // Outbound queue is dry: half-close the write direction and
            // wait for the peer to acknowledge with EOF.
            if let Err(e) = framed.close().await {
                tracing::debug!("write half-close failed: {}", e);
                break 'io;
            }
            write_closed = true;
        }

        tokio::select! {
            _ = liveness.tick() => {}

            command = commands.recv(), if !draining => {
                match command {
                    Some(Command::Send(message)) => outgoing.push_back(message),
                    Some(Command::Disconnect) | None => {
                        tracing::debug!("disconnect requested");
                        draining = true;
                        shared.state().tx_connected = false;
                    }
                }
            }

            frame = framed.next() => {
                match frame {
                    Some(Ok(message)) => {
                        tracing::trace!("received message {}", message);
                        shared.incoming.push_back(message);
                    }
                    Some(Err(e)) => {
                        log_read_error(&e);
                        break 'io;
                    }
                    None => {
                        // Clean EOF: during shutdown this is the peer's
                        // acknowledgement, otherwise the peer hung up.
                        tracing::debug!("connection closed by EOF from server");
                        shared.state().rx_connected = false;
                        break 'io;
                    }
                }
            }
        }

        // Write chain: each send puts header and body on the wire as one
        // contiguous flush, front of the queue first.
        while let Some(message) = outgoing.pop_front() {
            if let Err(e) = framed.send(message).await {
                tracing::debug!("write failed: {}", e);
                break 'io;
            }
        }
    }

    // Whatever never made it out is dropped with the connection.
    if !outgoing.is_empty() {
        tracing::debug!("discarding {} unsent messages", outgoing.len());
        outgoing.clear();
    }
}

fn log_read_error(err: &CodecError) {
    match err {
        CodecError::Io(e) => match e.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset => {
                tracing::debug!("connection reset by server: {}", e);
            }
            io::ErrorKind::ConnectionAborted => {
                tracing::debug!("connection aborted: {}", e);
            }
            _ => {
                tracing::error!("network thread terminating due to read error: {}", e);
            }
        },
        CodecError::MessageTooLarge { size, max } => {
            tracing::error!(
                "server declared a {} byte message (max {}), closing connection",
                size,
                max
            );
        }
        CodecError::Bincode(e) => {
            tracing::error!("undecodable frame: {}", e);
        }
    }
}
