//! Connection establishment
//!
//! Resolve the destination to candidate endpoints, then attempt them in
//! order with a fixed backoff between rounds, all bounded by one overall
//! deadline. Expiry tears down whatever is half-open; it does not reach
//! into a connect attempt that is already completing.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpSocket, TcpStream};

use armada_utils::{ArmadaError, Result};

use crate::config::NetConfig;

/// Connect to `address:port`, retrying until `timeout` elapses.
///
/// Candidates are tried in resolution order; when all fail, the round
/// restarts after the configured backoff. Resolution failure ends the
/// attempt unless `retry_resolution` is set.
pub(crate) async fn establish(
    address: &str,
    port: u16,
    config: &NetConfig,
    timeout: Duration,
) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, connect_with_retry(address, port, config)).await {
        Ok(result) => result,
        Err(_) => Err(ArmadaError::ConnectionTimeout {
            millis: timeout.as_millis() as u64,
        }),
    }
}

async fn connect_with_retry(address: &str, port: u16, config: &NetConfig) -> Result<TcpStream> {
    let candidates = loop {
        match resolve(address, port).await {
            Ok(candidates) => break candidates,
            Err(e) if config.retry_resolution => {
                tracing::debug!("{}, retrying after backoff", e);
                tokio::time::sleep(config.retry_backoff()).await;
            }
            Err(e) => return Err(e),
        }
    };

    loop {
        for addr in &candidates {
            match connect_once(*addr, config).await {
                Ok(stream) => {
                    tracing::info!("Connected to server at {}", addr);
                    return Ok(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::AddrNotAvailable => {
                    // Transient local-address shortage; not a peer failure
                    tracing::trace!("connect to {}: {}", addr, e);
                }
                Err(e) => {
                    tracing::debug!("connect to {} failed: {}, advancing", addr, e);
                }
            }
        }
        tracing::trace!("all candidates failed, restarting after backoff");
        tokio::time::sleep(config.retry_backoff()).await;
    }
}

async fn resolve(address: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let candidates: Vec<SocketAddr> = lookup_host((address, port))
        .await
        .map_err(|e| ArmadaError::resolution(format!("{}:{}: {}", address, port, e)))?
        .collect();

    if candidates.is_empty() {
        return Err(ArmadaError::resolution(format!(
            "{}:{}: no endpoints",
            address, port
        )));
    }

    tracing::debug!(
        "Attempting to connect to server at one of: {:?}",
        candidates
    );
    Ok(candidates)
}

async fn connect_once(addr: SocketAddr, config: &NetConfig) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    // Keep-alive surfaces an OS error when the peer goes quiet for good;
    // bounded linger keeps close() from blocking indefinitely while still
    // flushing pending packets.
    socket.set_keepalive(true)?;
    let stream = socket.connect(addr).await?;
    stream.set_linger(Some(config.linger()))?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_establish_to_live_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let config = NetConfig::default();
        let stream = establish("127.0.0.1", port, &config, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);

        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_establish_closed_port_times_out() {
        // Bind then drop to learn a port nothing is listening on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = NetConfig::default();
        let start = Instant::now();
        let result = establish("127.0.0.1", port, &config, Duration::from_millis(200)).await;
        let elapsed = start.elapsed();

        assert!(matches!(
            result,
            Err(ArmadaError::ConnectionTimeout { millis: 200 })
        ));
        // Refusals retry on the 100ms backoff until the deadline fires
        assert!(elapsed >= Duration::from_millis(150), "returned too early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "hung: {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_establish_resolution_failure_is_bounded() {
        let config = NetConfig::default();
        let start = Instant::now();
        let result = establish(
            "no-such-host.invalid",
            12346,
            &config,
            Duration::from_secs(5),
        )
        .await;

        // Resolution error when the resolver answers, deadline expiry when
        // it stalls; either way the attempt fails without hanging.
        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(6));
    }
}
