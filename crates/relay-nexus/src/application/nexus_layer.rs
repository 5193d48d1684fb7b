//! Hosts the [`Broker`] inside a Bridge.
//!
//! The layer sits on the inbound side.  It listens to every connection
//! manager for connect/disconnect, decodes inbound packets into Nexus
//! requests and sends the broker's deliveries back out through
//! `bridge.handle_outbound_packet`, addressed by `metadata.socket`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_bridge::{
    connection_listener, Bridge, BridgeError, ConnectionEvent, ConnectionManager, Flow, Layer,
    ListenerId, Payload, PayloadKind, PipelineMetadata, Socket, StartGuard, WeakBridge,
};
use relay_core::{CodecError, NexusMessage};
use tracing::{debug, info, warn};

use crate::application::broker::{Broker, Delivery};
use crate::domain::ClientId;

const NAME: &str = "nexus";

struct NexusState {
    broker: Mutex<Broker>,
    sockets: Mutex<HashMap<ClientId, Arc<dyn Socket>>>,
}

impl NexusState {
    async fn on_connected(&self, socket: Arc<dyn Socket>, bridge: &Bridge) {
        let client = socket.id().to_string();
        info!(client = %client, peer = ?socket.peer_addr(), "nexus client connected");
        self.sockets.lock().insert(client.clone(), socket);
        let deliveries = self.broker.lock().connect(&client);
        if let Err(e) = self.dispatch(deliveries, bridge).await {
            warn!(client = %client, "handshake failed: {e}");
        }
    }

    async fn on_disconnected(&self, client: &str, bridge: &Bridge) {
        info!(client, "nexus client disconnected");
        self.sockets.lock().remove(client);
        let deliveries = self.broker.lock().disconnect(client);
        if let Err(e) = self.dispatch(deliveries, bridge).await {
            debug!(client, "leave notification failed: {e}");
        }
    }

    /// Forgets every client and socket.  Used on stop, after the connection
    /// listeners are gone and the sockets' `Disconnected` events can no longer
    /// reach the broker.
    fn reset(&self) {
        self.sockets.lock().clear();
        self.broker.lock().disconnect_all();
    }

    /// Sends every delivery.  Succeeds when at least one send succeeded (or
    /// there was nothing to send); otherwise returns the first error.
    async fn dispatch(
        &self,
        deliveries: Vec<Delivery>,
        bridge: &Bridge,
    ) -> Result<(), BridgeError> {
        if deliveries.is_empty() {
            return Ok(());
        }
        let mut first_error = None;
        let mut delivered = 0usize;
        for delivery in deliveries {
            match self.deliver(delivery, bridge).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!("nexus delivery failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) if delivered == 0 => Err(e),
            _ => Ok(()),
        }
    }

    async fn deliver(&self, delivery: Delivery, bridge: &Bridge) -> Result<(), BridgeError> {
        let socket = self
            .sockets
            .lock()
            .get(&delivery.recipient)
            .cloned()
            .ok_or_else(|| BridgeError::MissingTarget { layer: NAME.into() })?;
        let packet = delivery.message.to_packet().map_err(codec_error)?;
        let metadata = PipelineMetadata::outbound()
            .with_connection_id(delivery.recipient)
            .with_socket(socket);
        bridge
            .handle_outbound_packet(Payload::Packet(packet), Some(metadata))
            .await
            .map(|_| ())
    }
}

fn codec_error(err: CodecError) -> BridgeError {
    match err {
        CodecError::Json(source) => BridgeError::Encoding {
            layer: NAME.into(),
            source,
        },
        other => BridgeError::failure(NAME, other.to_string()),
    }
}

/// The Nexus protocol as a Bridge layer.
pub struct NexusLayer {
    state: Arc<NexusState>,
    managers: Vec<Arc<dyn ConnectionManager>>,
    registrations: Mutex<Vec<(usize, ListenerId)>>,
    guard: StartGuard,
}

impl NexusLayer {
    /// `managers` are observed for connect/disconnect events; starting them is
    /// left to the transport layer that owns them.
    pub fn new(managers: Vec<Arc<dyn ConnectionManager>>, leave_on_disconnect: bool) -> Self {
        Self {
            state: Arc::new(NexusState {
                broker: Mutex::new(Broker::new(leave_on_disconnect)),
                sockets: Mutex::new(HashMap::new()),
            }),
            managers,
            registrations: Mutex::new(Vec::new()),
            guard: StartGuard::new(),
        }
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.state.broker.lock().channel_names()
    }

    pub fn members(&self, channel: &str) -> Vec<ClientId> {
        self.state.broker.lock().members(channel)
    }

    pub fn client_count(&self) -> usize {
        self.state.broker.lock().client_count()
    }
}

#[async_trait]
impl Layer for NexusLayer {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self, bridge: &Bridge) -> Result<(), BridgeError> {
        if !self.guard.try_start() {
            return Ok(());
        }
        for (index, manager) in self.managers.iter().enumerate() {
            let state = Arc::clone(&self.state);
            let weak: WeakBridge = bridge.downgrade();
            let id = manager.on_connection_event(connection_listener(move |event| {
                let state = Arc::clone(&state);
                let bridge = weak.upgrade();
                async move {
                    let Some(bridge) = bridge else {
                        return;
                    };
                    match event {
                        ConnectionEvent::Established(socket) => {
                            state.on_connected(socket, &bridge).await;
                        }
                        ConnectionEvent::Disconnected(socket) => {
                            state.on_disconnected(socket.id(), &bridge).await;
                        }
                    }
                }
            }));
            self.registrations.lock().push((index, id));
        }
        Ok(())
    }

    async fn stop(&self, _bridge: &Bridge) -> Result<(), BridgeError> {
        if !self.guard.try_stop() {
            return Ok(());
        }
        let registrations = std::mem::take(&mut *self.registrations.lock());
        for (index, id) in registrations {
            self.managers[index].remove_listener(id);
        }
        self.state.reset();
        Ok(())
    }

    async fn process_inbound(
        &self,
        payload: Payload,
        metadata: &mut PipelineMetadata,
        bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        let Payload::Packet(packet) = &payload else {
            return Err(BridgeError::unexpected(NAME, PayloadKind::Packet, payload.kind()));
        };
        let Some(client) = metadata.connection_id.clone() else {
            return Err(BridgeError::MissingTarget { layer: NAME.into() });
        };
        let Some(message) = NexusMessage::from_packet(packet).map_err(codec_error)? else {
            debug!(client = %client, "ignoring non-nexus packet {}", packet.packet_type());
            return Ok(Flow::Continue(payload));
        };

        let deliveries = self.state.broker.lock().handle(&client, message);
        self.state.dispatch(deliveries, bridge).await?;
        Ok(Flow::Continue(payload))
    }
}
