use std::time::Duration;

use relay_bridge::{BridgeError, TransportError};
use relay_core::CodecError;
use thiserror::Error;

use crate::domain::config::ConfigError;

/// Errors surfaced by the Nexus server and client.
#[derive(Debug, Error)]
pub enum NexusError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("pipeline error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("protocol encoding error: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The server did not send `HANDSHAKE` in time.
    #[error("no HANDSHAKE received within {0:?}")]
    HandshakeTimeout(Duration),

    /// The first packet after connecting was not a valid `HANDSHAKE`.
    #[error("malformed HANDSHAKE from server")]
    BadHandshake,

    /// Broadcast payloads are merged into the message object, so they must be objects.
    #[error("broadcast payload must be a JSON object")]
    PayloadNotObject,

    /// Both the TCP and the WebSocket listener are disabled.
    #[error("no transport enabled")]
    NoTransport,
}
