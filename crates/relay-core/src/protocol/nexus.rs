//! Typed messages of the Nexus channel broadcast protocol.
//!
//! Every Nexus message travels as a [`Packet`] whose `type` is one of the
//! [`packet_types`] tags and whose `data` is the camelCase JSON payload below.
//!
//! | type        | direction        | payload                                   |
//! |-------------|------------------|-------------------------------------------|
//! | HANDSHAKE   | server → client  | `{clientId}`                              |
//! | SUBSCRIBE   | client → server  | `{channelName, secret?}`                  |
//! | UNSUBSCRIBE | client → server  | `{channelName}`                           |
//! | BROADCAST   | both             | `{channelName, clientId?, ...payload}`    |
//! | JOINED      | server → channel | `{clientId, channel}`                     |
//! | LEAVED      | server → channel | `{clientId, channel}`                     |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::codec::CodecError;
use crate::protocol::packet::Packet;

/// Packet type tags used by the Nexus protocol.
pub mod packet_types {
    pub const HANDSHAKE: &str = "HANDSHAKE";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    pub const BROADCAST: &str = "BROADCAST";
    pub const JOINED: &str = "JOINED";
    pub const LEAVED: &str = "LEAVED";
}

/// Issued once per connection, carrying the id the server assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub client_id: String,
}

/// Join (and lazily create) a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscribe {
    pub channel_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unsubscribe {
    pub channel_name: String,
}

/// A fan-out message.
///
/// Clients send it without `clientId`; the server stamps the sender's id
/// before forwarding, overwriting anything the client put there.  All other
/// fields are carried through untouched in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    pub channel_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Membership notification body shared by `JOINED` and `LEAVED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub client_id: String,
    pub channel: String,
}

/// Every message of the Nexus protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum NexusMessage {
    Handshake(Handshake),
    Subscribe(Subscribe),
    Unsubscribe(Unsubscribe),
    Broadcast(Broadcast),
    Joined(Membership),
    Leaved(Membership),
}

impl NexusMessage {
    /// The packet type tag this message is sent under.
    pub fn packet_type(&self) -> &'static str {
        match self {
            NexusMessage::Handshake(_) => packet_types::HANDSHAKE,
            NexusMessage::Subscribe(_) => packet_types::SUBSCRIBE,
            NexusMessage::Unsubscribe(_) => packet_types::UNSUBSCRIBE,
            NexusMessage::Broadcast(_) => packet_types::BROADCAST,
            NexusMessage::Joined(_) => packet_types::JOINED,
            NexusMessage::Leaved(_) => packet_types::LEAVED,
        }
    }

    /// Wraps the message in a fresh packet.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if the payload cannot be converted to JSON.
    pub fn to_packet(&self) -> Result<Packet, CodecError> {
        let data = match self {
            NexusMessage::Handshake(m) => serde_json::to_value(m)?,
            NexusMessage::Subscribe(m) => serde_json::to_value(m)?,
            NexusMessage::Unsubscribe(m) => serde_json::to_value(m)?,
            NexusMessage::Broadcast(m) => serde_json::to_value(m)?,
            NexusMessage::Joined(m) | NexusMessage::Leaved(m) => serde_json::to_value(m)?,
        };
        Ok(Packet::new(self.packet_type(), data))
    }

    /// Parses a packet into a Nexus message.
    ///
    /// Returns `Ok(None)` for packet types that are not part of the protocol,
    /// so callers can ignore foreign traffic without treating it as an error.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if the type is known but the payload does
    /// not have the expected shape.
    pub fn from_packet<M>(packet: &Packet<Value, M>) -> Result<Option<Self>, CodecError> {
        let data = packet.data().clone();
        let message = match packet.packet_type() {
            packet_types::HANDSHAKE => NexusMessage::Handshake(serde_json::from_value(data)?),
            packet_types::SUBSCRIBE => NexusMessage::Subscribe(serde_json::from_value(data)?),
            packet_types::UNSUBSCRIBE => NexusMessage::Unsubscribe(serde_json::from_value(data)?),
            packet_types::BROADCAST => NexusMessage::Broadcast(serde_json::from_value(data)?),
            packet_types::JOINED => NexusMessage::Joined(serde_json::from_value(data)?),
            packet_types::LEAVED => NexusMessage::Leaved(serde_json::from_value(data)?),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
