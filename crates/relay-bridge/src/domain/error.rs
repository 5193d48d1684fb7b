//! Error types for the pipeline and its transports.

use relay_core::CodecError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::domain::payload::{PayloadKind, TextEncoding};
use crate::domain::socket::FrameMode;

/// Errors raised by sockets, connection managers and the wire codec.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket was closed (locally or by the peer) before the operation finished.
    #[error("connection closed")]
    Closed,

    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The payload variant cannot be written in this socket's frame mode.
    #[error("cannot send a {found} payload on a {mode} socket")]
    UnsupportedPayload { mode: FrameMode, found: PayloadKind },

    /// A line-framed transport was asked to send a frame containing `\n`.
    #[error("frame contains a line terminator")]
    EmbeddedNewline,
}

/// Errors raised by layers while processing a payload.
///
/// Every variant names the layer that failed so an
/// [`ErrorHandler`](crate::ErrorHandler) can decide per layer.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("[{layer}] JSON encoding failed: {source}")]
    Encoding {
        layer: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("[{layer}] bytes are not valid {encoding} text")]
    TextDecoding { layer: String, encoding: TextEncoding },

    #[error("[{layer}] text cannot be represented as {encoding}")]
    TextEncoding { layer: String, encoding: TextEncoding },

    #[error("[{layer}] expected a {expected} payload, got {found}")]
    UnexpectedPayload {
        layer: String,
        expected: PayloadKind,
        found: PayloadKind,
    },

    #[error("[{layer}] transport error: {source}")]
    Transport {
        layer: String,
        #[source]
        source: TransportError,
    },

    /// An outbound payload reached a socket layer without a target socket.
    #[error("[{layer}] no target socket in metadata")]
    MissingTarget { layer: String },

    /// An outbound payload reached the party layer without a destination party.
    #[error("[{layer}] no destination party")]
    MissingParty { layer: String },

    /// Catch-all for application layers.
    #[error("[{layer}] {message}")]
    Layer { layer: String, message: String },
}

impl BridgeError {
    /// Name of the layer that raised the error.
    pub fn layer(&self) -> &str {
        match self {
            BridgeError::Encoding { layer, .. }
            | BridgeError::TextDecoding { layer, .. }
            | BridgeError::TextEncoding { layer, .. }
            | BridgeError::UnexpectedPayload { layer, .. }
            | BridgeError::Transport { layer, .. }
            | BridgeError::MissingTarget { layer }
            | BridgeError::MissingParty { layer }
            | BridgeError::Layer { layer, .. } => layer,
        }
    }

    pub fn transport(layer: impl Into<String>, source: TransportError) -> Self {
        BridgeError::Transport {
            layer: layer.into(),
            source,
        }
    }

    pub fn failure(layer: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::Layer {
            layer: layer.into(),
            message: message.into(),
        }
    }

    pub fn unexpected(layer: impl Into<String>, expected: PayloadKind, found: PayloadKind) -> Self {
        BridgeError::UnexpectedPayload {
            layer: layer.into(),
            expected,
            found,
        }
    }

    /// True when the underlying cause is a socket that has already closed.
    pub fn is_closed_socket(&self) -> bool {
        matches!(
            self,
            BridgeError::Transport {
                source: TransportError::Closed,
                ..
            }
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_name_is_reported_for_every_variant() {
        let errors = [
            BridgeError::failure("a", "boom"),
            BridgeError::MissingTarget { layer: "b".into() },
            BridgeError::unexpected("c", PayloadKind::Text, PayloadKind::Bytes),
            BridgeError::transport("d", TransportError::Closed),
        ];
        let names: Vec<&str> = errors.iter().map(BridgeError::layer).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_display_includes_layer_and_kinds() {
        let err = BridgeError::unexpected("json-string", PayloadKind::Text, PayloadKind::Bytes);
        assert_eq!(
            err.to_string(),
            "[json-string] expected a text payload, got bytes"
        );
    }

    #[test]
    fn test_closed_socket_detection() {
        assert!(BridgeError::transport("x", TransportError::Closed).is_closed_socket());
        assert!(!BridgeError::transport("x", TransportError::EmbeddedNewline).is_closed_socket());
    }
}
