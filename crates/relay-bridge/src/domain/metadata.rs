//! Per-invocation context that travels alongside a payload.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::socket::Socket;

/// Which chain a payload is travelling through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

/// Addressing written by the party layer when it unwraps an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyInfo {
    pub id: String,
    pub from_party: String,
    pub to_party: String,
}

/// Context for one `handle_*_packet` call.
///
/// `direction` is stamped by the [`Bridge`](crate::Bridge) before any layer
/// sees the metadata and cannot be changed by layers.  Every other field is
/// optional; layers must cope with it being absent.
#[derive(Clone)]
pub struct PipelineMetadata {
    direction: Direction,
    /// Socket the payload arrived on (inbound) or should be written to (outbound).
    pub socket: Option<Arc<dyn Socket>>,
    /// Connection id used by server transports to pick a single client.
    pub connection_id: Option<String>,
    pub party: Option<PartyInfo>,
    /// Free-form fields for layers that need to pass data down the chain.
    pub extra: Map<String, Value>,
}

impl PipelineMetadata {
    fn with_direction(direction: Direction) -> Self {
        Self {
            direction,
            socket: None,
            connection_id: None,
            party: None,
            extra: Map::new(),
        }
    }

    pub fn inbound() -> Self {
        Self::with_direction(Direction::Inbound)
    }

    pub fn outbound() -> Self {
        Self::with_direction(Direction::Outbound)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn with_socket(mut self, socket: Arc<dyn Socket>) -> Self {
        self.socket = Some(socket);
        self
    }

    pub fn with_connection_id(mut self, id: impl Into<String>) -> Self {
        self.connection_id = Some(id.into());
        self
    }

    pub fn with_party(mut self, party: PartyInfo) -> Self {
        self.party = Some(party);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for PipelineMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineMetadata")
            .field("direction", &self.direction)
            .field("socket", &self.socket.as_ref().map(|s| s.id().to_string()))
            .field("connection_id", &self.connection_id)
            .field("party", &self.party)
            .field("extra", &self.extra)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
