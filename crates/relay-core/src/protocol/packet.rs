//! The packet envelope carried by every transport.
//!
//! A [`Packet`] is an immutable value object:
//!
//! ```text
//! { id: unique string, time: ms since epoch, type: tag, data: T, metadata: M }
//! ```
//!
//! `id` is unique per logical message and `time` is assigned once, at
//! construction.  `metadata` is receiver-side context only: it is skipped when
//! the packet is serialized and comes back as `M::default()` when a packet is
//! decoded, so transport layers attach it after the fact.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Wire-level envelope with an opaque payload `T` and local metadata `M`.
///
/// # Examples
///
/// ```rust
/// use relay_core::Packet;
/// use serde_json::json;
///
/// let packet: Packet = Packet::new("GREETING", json!({"hello": "world"}));
/// assert_eq!(packet.packet_type(), "GREETING");
/// assert!(packet.metadata().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: DeserializeOwned, M: Default"
))]
pub struct Packet<T = Value, M = Map<String, Value>> {
    id: String,
    time: u64,
    #[serde(rename = "type")]
    packet_type: String,
    data: T,
    #[serde(skip)]
    metadata: M,
}

impl<T, M: Default> Packet<T, M> {
    /// Creates a packet with a fresh UUID v4 id and the current time.
    pub fn new(packet_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            time: now_millis(),
            packet_type: packet_type.into(),
            data,
            metadata: M::default(),
        }
    }
}

impl<T, M> Packet<T, M> {
    /// Unique id of the logical message.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Construction time in milliseconds since the Unix epoch.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// The type tag (`"BROADCAST"`, `"SUBSCRIBE"`, ...).
    pub fn packet_type(&self) -> &str {
        &self.packet_type
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Returns the same message (id, time, type and data unchanged) carrying
    /// different receiver-side metadata.
    pub fn with_metadata<N>(self, metadata: N) -> Packet<T, N> {
        Packet {
            id: self.id,
            time: self.time,
            packet_type: self.packet_type,
            data: self.data,
            metadata,
        }
    }
}

/// Milliseconds since the Unix epoch, saturating to 0 if the clock is before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
