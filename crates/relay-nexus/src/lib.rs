//! # relay-nexus
//!
//! A channel-based publish/subscribe broker built from relay-bridge parts.
//!
//! Clients connect over TCP or WebSocket, receive a `HANDSHAKE` carrying
//! their id, then `SUBSCRIBE` to named channels (optionally protected by a
//! secret fixed by the first subscriber) and `BROADCAST` to the other
//! members.
//!
//! - **`domain`** – Channels, [`NexusConfig`] and [`NexusError`].
//! - **`application`** – The pure [`Broker`] state machine and the
//!   [`NexusLayer`] that runs it inside a Bridge.
//! - **`infrastructure`** – [`NexusServer`] and [`NexusClient`].

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{Broker, Delivery, NexusLayer};
pub use domain::{Channel, ClientId, ConfigError, NexusConfig, NexusError};
pub use infrastructure::{NexusClient, NexusEvent, NexusServer};
