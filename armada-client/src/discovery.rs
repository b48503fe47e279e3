//! LAN server discovery
//!
//! One-shot UDP exchange: broadcast the discovery question on the
//! well-known port, then wait briefly for any server to answer with the
//! recognized prefix followed by its name.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use armada_protocol::{DISCOVERY_ANSWER, DISCOVERY_QUESTION};
use armada_utils::Result;

/// Each broadcast attempt waits this long for an answer
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// A server that answered a discovery broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    pub address: IpAddr,
    pub name: String,
}

/// The broadcast endpoint for a given discovery port
pub(crate) fn broadcast_target(port: u16) -> SocketAddr {
    (Ipv4Addr::BROADCAST, port).into()
}

/// Send one discovery question to `target` and collect whoever answers
pub(crate) async fn discover(target: SocketAddr) -> Vec<DiscoveredServer> {
    match question_answer(target).await {
        Ok(Some(server)) => {
            tracing::debug!("discovered server {:?}", server);
            vec![server]
        }
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::debug!("discovery broadcast failed: {}", e);
            Vec::new()
        }
    }
}

async fn question_answer(target: SocketAddr) -> Result<Option<DiscoveredServer>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    socket.send_to(DISCOVERY_QUESTION.as_bytes(), target).await?;

    let mut buf = [0u8; 1024];
    match tokio::time::timeout(DISCOVERY_TIMEOUT, socket.recv_from(&mut buf)).await {
        Ok(Ok((len, sender))) => {
            let answer = String::from_utf8_lossy(&buf[..len]);
            let Some(name) = answer.strip_prefix(DISCOVERY_ANSWER) else {
                // Something else on the discovery port; not a server
                return Ok(None);
            };
            let name = name.trim().to_string();
            // A server naming itself "localhost" is this machine
            let address = if name == "localhost" {
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            } else {
                sender.ip()
            };
            Ok(Some(DiscoveredServer { address, name }))
        }
        Ok(Err(e)) => Err(e.into()),
        // Quiet network: no server answered within the window
        Err(_) => Ok(None),
    }
}
