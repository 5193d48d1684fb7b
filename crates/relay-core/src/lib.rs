//! # relay-core
//!
//! Shared wire-level types for the relay packet pipeline.
//!
//! This crate is used by both the Bridge (`relay-bridge`) and the Nexus broker
//! (`relay-nexus`).  It has no dependencies on async runtimes or sockets: it
//! only describes *what* travels over a transport and how it is turned into
//! bytes.
//!
//! - **`protocol::packet`** – The [`Packet`] envelope: id, timestamp, type tag,
//!   payload and receiver-side metadata.
//! - **`protocol::codec`** – JSON packet encoding plus the newline framer used
//!   by every TCP transport.
//! - **`protocol::nexus`** – Typed messages of the Nexus publish/subscribe
//!   protocol (`HANDSHAKE`, `SUBSCRIBE`, `BROADCAST`, ...).

pub mod protocol;

pub use protocol::codec::{decode_packet, encode_line, encode_packet, CodecError, LineFramer};
pub use protocol::nexus::NexusMessage;
pub use protocol::packet::Packet;
