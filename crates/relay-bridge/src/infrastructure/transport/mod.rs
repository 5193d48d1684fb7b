//! Transport layers: the pipeline stages that touch the network.
//!
//! - [`ClientTransportLayer`] dials one connection and reconnects when it drops.
//! - [`ServerTransportLayer`] listens and routes outbound data to one client,
//!   or broadcasts it to every client.
//! - [`GenericSocketLayer`] delegates accept/connect to any number of
//!   [`ConnectionManager`](crate::ConnectionManager)s and routes outbound data
//!   to the socket named in the metadata.
//!
//! All three feed received data into `bridge.handle_inbound_packet` with the
//! source socket in [`PipelineMetadata::socket`].

pub mod client;
pub mod generic;
pub mod server;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::application::WeakBridge;
use crate::domain::{data_listener, ListenerId, PipelineMetadata, Socket};

pub use client::ClientTransportLayer;
pub use generic::GenericSocketLayer;
pub use server::ServerTransportLayer;

/// Subscribes `socket` so every payload it receives enters `bridge`'s inbound
/// chain, tagged with the socket and its id.
///
/// The bridge is read from `bridge` when data arrives, not when the socket is
/// wired, so a connection opened before the layer was started still reaches
/// the bridge that starts it later.
///
/// Pipeline errors are logged and the connection stays open: one bad message
/// does not end the session.
pub(crate) fn forward_to_bridge(
    socket: &Arc<dyn Socket>,
    bridge: &Arc<Mutex<WeakBridge>>,
) -> ListenerId {
    let weak_socket = Arc::downgrade(socket);
    let bridge = Arc::clone(bridge);
    socket.on_data_received(data_listener(move |data| {
        let bridge = bridge.lock().upgrade();
        let socket = weak_socket.upgrade();
        async move {
            let (Some(bridge), Some(socket)) = (bridge, socket) else {
                return;
            };
            let metadata = PipelineMetadata::inbound()
                .with_connection_id(socket.id())
                .with_socket(Arc::clone(&socket));
            if let Err(e) = bridge.handle_inbound_packet(data, Some(metadata)).await {
                warn!(connection = socket.id(), "inbound pipeline error: {e}");
            }
        }
    }))
}
