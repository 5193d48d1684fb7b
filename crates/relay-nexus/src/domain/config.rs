//! Nexus server configuration, loaded from TOML.
//!
//! Every field is optional; a missing file section keeps its default.
//!
//! ```toml
//! leave_on_disconnect = false
//!
//! [tcp]
//! enabled = true
//! bind_address = "0.0.0.0"
//! port = 9000
//!
//! [websocket]
//! enabled = true
//! bind_address = "0.0.0.0"
//! port = 9001
//! ```

use std::path::{Path, PathBuf};

use relay_bridge::{TcpServerConfig, WsServerConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_true() -> bool {
    true
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

/// One listener section (`[tcp]` or `[websocket]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    pub port: u16,
}

fn default_tcp_section() -> ListenerSection {
    ListenerSection {
        enabled: true,
        bind_address: default_bind_address(),
        port: default_tcp_port(),
    }
}

fn default_ws_section() -> ListenerSection {
    ListenerSection {
        port: default_ws_port(),
        ..default_tcp_section()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NexusConfig {
    #[serde(default = "default_tcp_section", deserialize_with = "tcp_section")]
    pub tcp: ListenerSection,
    #[serde(default = "default_ws_section", deserialize_with = "ws_section")]
    pub websocket: ListenerSection,
    /// Broadcast `LEAVED` to the remaining members when a client disconnects
    /// without unsubscribing.
    #[serde(default)]
    pub leave_on_disconnect: bool,
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self {
            tcp: default_tcp_section(),
            websocket: default_ws_section(),
            leave_on_disconnect: false,
        }
    }
}

impl NexusConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the text is not valid TOML or a field has
    /// the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
    /// if it is not a valid config.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// The TCP listener, if enabled.
    pub fn tcp_server(&self) -> Option<TcpServerConfig> {
        self.tcp
            .enabled
            .then(|| TcpServerConfig::new(self.tcp.bind_address.clone(), self.tcp.port))
    }

    /// The WebSocket listener, if enabled.
    pub fn ws_server(&self) -> Option<WsServerConfig> {
        self.websocket.enabled.then(|| {
            WsServerConfig::new(self.websocket.bind_address.clone(), self.websocket.port)
        })
    }
}

/// A listener section whose `port` may be omitted.
#[derive(Deserialize)]
struct PartialSection {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_bind_address")]
    bind_address: String,
    port: Option<u16>,
}

impl PartialSection {
    fn with_default_port(self, port: u16) -> ListenerSection {
        ListenerSection {
            enabled: self.enabled,
            bind_address: self.bind_address,
            port: self.port.unwrap_or(port),
        }
    }
}

fn tcp_section<'de, D: serde::Deserializer<'de>>(d: D) -> Result<ListenerSection, D::Error> {
    PartialSection::deserialize(d).map(|s| s.with_default_port(default_tcp_port()))
}

fn ws_section<'de, D: serde::Deserializer<'de>>(d: D) -> Result<ListenerSection, D::Error> {
    PartialSection::deserialize(d).map(|s| s.with_default_port(default_ws_port()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = NexusConfig::from_toml_str("").unwrap();
        assert_eq!(config, NexusConfig::default());
        assert_eq!(config.tcp_server().unwrap().port, 9000);
        assert_eq!(config.ws_server().unwrap().port, 9001);
        assert!(!config.leave_on_disconnect);
    }

    #[test]
    fn test_partial_sections_keep_their_own_default_port() {
        // Arrange
        let text = r#"
            leave_on_disconnect = true

            [tcp]
            bind_address = "127.0.0.1"

            [websocket]
            enabled = false
        "#;

        // Act
        let config = NexusConfig::from_toml_str(text).unwrap();

        // Assert
        assert!(config.leave_on_disconnect);
        assert_eq!(config.tcp.bind_address, "127.0.0.1");
        assert_eq!(config.tcp.port, 9000);
        assert_eq!(config.websocket.port, 9001);
        assert!(config.ws_server().is_none());
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let err = NexusConfig::from_toml_str("[tcp]\nport = \"high\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = NexusConfig::load("/nonexistent/relay-nexus.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
