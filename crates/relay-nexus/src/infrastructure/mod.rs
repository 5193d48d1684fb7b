//! Network-facing Nexus pieces: the server and the client.

pub mod client;
pub mod server;

pub use client::{NexusClient, NexusEvent};
pub use server::NexusServer;
