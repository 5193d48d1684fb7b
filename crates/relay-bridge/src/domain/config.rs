//! Transport configuration.
//!
//! These are the only externally configured parameters the transports need:
//! where to connect or bind, and how long a client waits between reconnect
//! attempts.  All structs deserialize from TOML or JSON with every field
//! optional, so a config file only has to mention what it changes.
//!
//! ```toml
//! [tcp]
//! bind_address = "0.0.0.0"
//! port = 9000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_hostname() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_tcp_port() -> u16 {
    9000
}

fn default_ws_port() -> u16 {
    9001
}

fn default_ws_url() -> String {
    format!("ws://127.0.0.1:{}", default_ws_port())
}

fn default_reconnect_ms() -> u64 {
    1000
}

/// TCP client transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpClientConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_tcp_port")]
    pub port: u16,
    /// Delay between failed reconnect attempts, in milliseconds.
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_interval_ms: u64,
}

impl TcpClientConfig {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            reconnect_interval_ms: default_reconnect_ms(),
        }
    }

    /// `host:port`, as passed to the resolver.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl Default for TcpClientConfig {
    fn default() -> Self {
        Self::new(default_hostname(), default_tcp_port())
    }
}

/// TCP server transport settings.  Port `0` asks the OS for a free port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_tcp_port")]
    pub port: u16,
}

impl TcpServerConfig {
    pub fn new(bind_address: impl Into<String>, port: u16) -> Self {
        Self {
            bind_address: bind_address.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self::new(default_bind_address(), default_tcp_port())
    }
}

/// WebSocket client transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsClientConfig {
    #[serde(default = "default_ws_url")]
    pub url: String,
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_interval_ms: u64,
}

impl WsClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_interval_ms: default_reconnect_ms(),
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self::new(default_ws_url())
    }
}

/// WebSocket server transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_ws_port")]
    pub port: u16,
}

impl WsServerConfig {
    pub fn new(bind_address: impl Into<String>, port: u16) -> Self {
        Self {
            bind_address: bind_address.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for WsServerConfig {
    fn default() -> Self {
        Self::new(default_bind_address(), default_ws_port())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
