//! Client-side configuration loading
//!
//! Network tuning knobs with sensible defaults, optionally overridden by
//! the `[network]` table of the shared config file.

use std::time::Duration;

use armada_protocol::{DISCOVERY_PORT, MESSAGE_PORT};

/// Default overall connection deadline
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Network configuration for [`NetworkClient`](crate::NetworkClient)
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// TCP port game servers listen on
    pub message_port: u16,
    /// UDP port used for LAN discovery broadcasts
    pub discovery_port: u16,
    /// Delay between connect retry rounds, in milliseconds
    pub retry_backoff_ms: u64,
    /// Whether a failed host resolution re-enters the retry loop instead
    /// of failing the attempt outright
    pub retry_resolution: bool,
    /// SO_LINGER bound applied to the connected socket, in seconds
    pub linger_secs: u64,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            message_port: MESSAGE_PORT,
            discovery_port: DISCOVERY_PORT,
            retry_backoff_ms: 100,
            retry_resolution: false,
            linger_secs: 10,
        }
    }
}

impl NetConfig {
    /// Load from `~/.config/armada/config.toml`
    ///
    /// Returns defaults if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = armada_utils::config_file();

        if !path.exists() {
            tracing::debug!("Config file not found, using default network config");
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        #[derive(Debug, Default, serde::Deserialize)]
        #[serde(default)]
        struct ConfigFile {
            network: Option<NetConfig>,
        }

        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.network.unwrap_or_default())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn linger(&self) -> Duration {
        Duration::from_secs(self.linger_secs)
    }
}
