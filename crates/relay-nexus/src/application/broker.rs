//! The Nexus state machine.
//!
//! [`Broker`] is synchronous and does no I/O: every event returns the list of
//! messages to send.  The caller owns the sockets and performs the deliveries.
//!
//! ```text
//!  connect ──► HANDSHAKE to the client
//!  SUBSCRIBE   ──► create channel if new; if authorized and not yet a member,
//!                  add and send JOINED to every member (new one included)
//!  BROADCAST   ──► members only; stamped with the sender id, sent to the others
//!  UNSUBSCRIBE ──► members only; LEAVED to every member, then remove
//!  disconnect  ──► remove everywhere; LEAVED to the rest only if configured
//! ```
//!
//! Protocol violations (wrong secret, broadcast from a non-member, unknown
//! channel) produce no deliveries and no error reply.

use std::collections::{BTreeMap, BTreeSet};

use relay_core::protocol::nexus::{Broadcast, Handshake, Membership, Subscribe, Unsubscribe};
use relay_core::NexusMessage;
use tracing::{debug, info};

use crate::domain::{Channel, ClientId};

/// One message addressed to one client.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub recipient: ClientId,
    pub message: NexusMessage,
}

impl Delivery {
    fn new(recipient: impl Into<ClientId>, message: NexusMessage) -> Self {
        Self {
            recipient: recipient.into(),
            message,
        }
    }
}

#[derive(Debug, Default)]
pub struct Broker {
    channels: BTreeMap<String, Channel>,
    clients: BTreeSet<ClientId>,
    leave_on_disconnect: bool,
}

impl Broker {
    pub fn new(leave_on_disconnect: bool) -> Self {
        Self {
            leave_on_disconnect,
            ..Self::default()
        }
    }

    /// Registers a newly connected client and greets it.
    pub fn connect(&mut self, client: &str) -> Vec<Delivery> {
        self.clients.insert(client.to_string());
        let handshake = NexusMessage::Handshake(Handshake {
            client_id: client.to_string(),
        });
        vec![Delivery::new(client, handshake)]
    }

    /// Applies one client request.
    pub fn handle(&mut self, client: &str, message: NexusMessage) -> Vec<Delivery> {
        match message {
            NexusMessage::Subscribe(req) => self.subscribe(client, req),
            NexusMessage::Unsubscribe(req) => self.unsubscribe(client, req),
            NexusMessage::Broadcast(req) => self.broadcast(client, req),
            other => {
                debug!(client, "ignoring client-sent {}", other.packet_type());
                Vec::new()
            }
        }
    }

    /// Removes the client from every channel.
    pub fn disconnect(&mut self, client: &str) -> Vec<Delivery> {
        self.clients.remove(client);
        let mut deliveries = Vec::new();
        for channel in self.channels.values_mut() {
            if !channel.remove(client) {
                continue;
            }
            debug!(client, channel = channel.name(), "removed on disconnect");
            if self.leave_on_disconnect {
                let leaved = membership(client, channel.name());
                deliveries.extend(channel.members().map(|member| {
                    Delivery::new(member.as_str(), NexusMessage::Leaved(leaved.clone()))
                }));
            }
        }
        deliveries
    }

    /// Forgets every client without notifying anyone.  Channels and their
    /// secrets survive, empty.
    pub fn disconnect_all(&mut self) {
        debug!(clients = self.clients.len(), "dropping every client");
        self.clients.clear();
        for channel in self.channels.values_mut() {
            channel.clear();
        }
    }

    fn subscribe(&mut self, client: &str, req: Subscribe) -> Vec<Delivery> {
        let channel = self
            .channels
            .entry(req.channel_name.clone())
            .or_insert_with(|| {
                info!(
                    channel = %req.channel_name,
                    secret = req.secret.is_some(),
                    "channel created"
                );
                Channel::new(req.channel_name.clone(), req.secret.clone())
            });

        if !channel.authorize(req.secret.as_deref()) {
            debug!(client, channel = channel.name(), "subscribe rejected");
            return Vec::new();
        }
        if !channel.add(client) {
            return Vec::new();
        }

        let joined = membership(client, channel.name());
        channel
            .members()
            .map(|member| Delivery::new(member.as_str(), NexusMessage::Joined(joined.clone())))
            .collect()
    }

    fn unsubscribe(&mut self, client: &str, req: Unsubscribe) -> Vec<Delivery> {
        let Some(channel) = self.channels.get_mut(&req.channel_name) else {
            return Vec::new();
        };
        if !channel.contains(client) {
            return Vec::new();
        }

        let leaved = membership(client, channel.name());
        let deliveries = channel
            .members()
            .map(|member| Delivery::new(member.as_str(), NexusMessage::Leaved(leaved.clone())))
            .collect();
        channel.remove(client);
        deliveries
    }

    fn broadcast(&mut self, client: &str, mut req: Broadcast) -> Vec<Delivery> {
        let Some(channel) = self.channels.get(&req.channel_name) else {
            debug!(client, channel = %req.channel_name, "broadcast to unknown channel");
            return Vec::new();
        };
        if !channel.contains(client) {
            debug!(client, channel = channel.name(), "broadcast from non-member dropped");
            return Vec::new();
        }

        req.client_id = Some(client.to_string());
        channel
            .members()
            .filter(|member| member.as_str() != client)
            .map(|member| Delivery::new(member.as_str(), NexusMessage::Broadcast(req.clone())))
            .collect()
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    /// Members of `channel`; empty if it does not exist.
    pub fn members(&self, channel: &str) -> Vec<ClientId> {
        self.channels
            .get(channel)
            .map(|c| c.members().cloned().collect())
            .unwrap_or_default()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

fn membership(client: &str, channel: &str) -> Membership {
    Membership {
        client_id: client.to_string(),
        channel: channel.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
