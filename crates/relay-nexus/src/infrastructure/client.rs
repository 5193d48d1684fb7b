//! Client side of the Nexus protocol.
//!
//! ```no_run
//! # use std::time::Duration;
//! # use relay_nexus::{NexusClient, NexusEvent};
//! # async fn demo() -> Result<(), relay_nexus::NexusError> {
//! let (client, mut events) =
//!     NexusClient::connect_tcp("127.0.0.1:9000", Duration::from_secs(5)).await?;
//! client.subscribe("lobby", None).await?;
//! client.broadcast("lobby", serde_json::json!({"text": "hello"})).await?;
//! while let Some(event) = events.recv().await {
//!     if let NexusEvent::Broadcast(msg) = event {
//!         println!("{:?} says {:?}", msg.client_id, msg.payload);
//!     }
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use relay_bridge::{data_listener, Connection, FrameMode, Payload, Socket};
use relay_core::protocol::nexus::{
    packet_types, Broadcast, Handshake, Membership, Subscribe, Unsubscribe,
};
use relay_core::NexusMessage;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::NexusError;

/// Server-to-client notifications after the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum NexusEvent {
    Joined(Membership),
    Leaved(Membership),
    Broadcast(Broadcast),
}

pub struct NexusClient {
    client_id: String,
    connection: Arc<Connection>,
    channels: Mutex<BTreeSet<String>>,
}

impl NexusClient {
    /// Connects over TCP (`host:port`) and waits up to `handshake_timeout`
    /// for the server's `HANDSHAKE`.
    ///
    /// # Errors
    ///
    /// [`NexusError::Transport`] if the connection fails,
    /// [`NexusError::HandshakeTimeout`] if no handshake arrives in time.
    pub async fn connect_tcp(
        addr: &str,
        handshake_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NexusEvent>), NexusError> {
        let connection = Connection::connect_tcp(addr, FrameMode::Packet).await?;
        Self::establish(connection, handshake_timeout).await
    }

    /// Connects over WebSocket (`ws://host:port`).
    ///
    /// # Errors
    ///
    /// Same as [`NexusClient::connect_tcp`].
    pub async fn connect_websocket(
        url: &str,
        handshake_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NexusEvent>), NexusError> {
        let connection = Connection::connect_websocket(url, FrameMode::Packet).await?;
        Self::establish(connection, handshake_timeout).await
    }

    async fn establish(
        connection: Arc<Connection>,
        handshake_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NexusEvent>), NexusError> {
        let handshake = connection.wait_for_packet(packet_types::HANDSHAKE);
        let (tx, rx) = mpsc::unbounded_channel();
        connection.on_data_received(data_listener(move |payload| {
            if let Some(event) = to_event(payload) {
                let _ = tx.send(event);
            }
            async {}
        }));
        connection.activate();

        let packet = match tokio::time::timeout(handshake_timeout, handshake).await {
            Ok(result) => result?,
            Err(_) => {
                connection.close().await;
                return Err(NexusError::HandshakeTimeout(handshake_timeout));
            }
        };
        let Some(NexusMessage::Handshake(Handshake { client_id })) =
            NexusMessage::from_packet(&packet)?
        else {
            connection.close().await;
            return Err(NexusError::BadHandshake);
        };

        info!(client = %client_id, "joined nexus");
        let client = Self {
            client_id,
            connection,
            channels: Mutex::new(BTreeSet::new()),
        };
        Ok((client, rx))
    }

    /// The id the server assigned in `HANDSHAKE`.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Channels this client has asked to join and not left.
    pub fn channels(&self) -> Vec<String> {
        self.channels.lock().iter().cloned().collect()
    }

    /// Asks to join `channel`.  Success is signalled by a `Joined` event; a
    /// rejected subscribe produces no reply at all.
    pub async fn subscribe(&self, channel: &str, secret: Option<&str>) -> Result<(), NexusError> {
        self.send(NexusMessage::Subscribe(Subscribe {
            channel_name: channel.to_string(),
            secret: secret.map(str::to_string),
        }))
        .await?;
        self.channels.lock().insert(channel.to_string());
        Ok(())
    }

    pub async fn unsubscribe(&self, channel: &str) -> Result<(), NexusError> {
        self.send(NexusMessage::Unsubscribe(Unsubscribe {
            channel_name: channel.to_string(),
        }))
        .await?;
        self.channels.lock().remove(channel);
        Ok(())
    }

    /// Sends `payload` (a JSON object) to the other members of `channel`.
    ///
    /// # Errors
    ///
    /// [`NexusError::PayloadNotObject`] for non-object payloads.
    pub async fn broadcast(&self, channel: &str, payload: Value) -> Result<(), NexusError> {
        let Value::Object(payload) = payload else {
            return Err(NexusError::PayloadNotObject);
        };
        self.send(NexusMessage::Broadcast(Broadcast {
            channel_name: channel.to_string(),
            client_id: None,
            payload,
        }))
        .await
    }

    /// Leaves every joined channel, then closes the connection.
    pub async fn close(&self) {
        for channel in self.channels() {
            if let Err(e) = self.unsubscribe(&channel).await {
                debug!(channel = %channel, "unsubscribe on close failed: {e}");
                break;
            }
        }
        self.connection.close().await;
    }

    /// Drops the connection without leaving any channel.
    pub async fn disconnect(&self) {
        self.connection.close().await;
    }

    async fn send(&self, message: NexusMessage) -> Result<(), NexusError> {
        let packet = message.to_packet()?;
        self.connection.send_data(Payload::Packet(packet)).await?;
        Ok(())
    }
}

fn to_event(payload: Payload) -> Option<NexusEvent> {
    let Payload::Packet(packet) = payload else {
        return None;
    };
    match NexusMessage::from_packet(&packet) {
        Ok(Some(NexusMessage::Joined(m))) => Some(NexusEvent::Joined(m)),
        Ok(Some(NexusMessage::Leaved(m))) => Some(NexusEvent::Leaved(m)),
        Ok(Some(NexusMessage::Broadcast(m))) => Some(NexusEvent::Broadcast(m)),
        Ok(_) => None,
        Err(e) => {
            warn!("malformed {} from server: {e}", packet.packet_type());
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
