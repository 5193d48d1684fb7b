//! The Nexus server: listeners plus a Bridge wired for the Nexus protocol.
//!
//! ```text
//!  TCP / WebSocket managers (packet frames)
//!        │ Established ─► NexusLayer (handshake)  ─┐
//!        │ data        ─► inbound:  NexusLayer     │ deliveries
//!        ◄──────────────  outbound: GenericSocketLayer ◄─┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use relay_bridge::{
    Bridge, ConnectionManager, FrameMode, GenericSocketLayer, ServerConnectionManager,
};
use tracing::info;

use crate::application::NexusLayer;
use crate::domain::{ClientId, NexusConfig, NexusError};

pub struct NexusServer {
    bridge: Bridge,
    nexus: Arc<NexusLayer>,
    tcp: Option<Arc<ServerConnectionManager>>,
    websocket: Option<Arc<ServerConnectionManager>>,
}

impl NexusServer {
    /// Builds (but does not start) a server for the enabled listeners.
    ///
    /// # Errors
    ///
    /// [`NexusError::NoTransport`] if both TCP and WebSocket are disabled.
    pub fn new(config: &NexusConfig) -> Result<Self, NexusError> {
        let tcp = config
            .tcp_server()
            .map(|c| Arc::new(ServerConnectionManager::tcp(c, FrameMode::Packet)));
        let websocket = config
            .ws_server()
            .map(|c| Arc::new(ServerConnectionManager::websocket(c, FrameMode::Packet)));

        let managers: Vec<Arc<dyn ConnectionManager>> = tcp
            .iter()
            .chain(websocket.iter())
            .map(|m| Arc::clone(m) as Arc<dyn ConnectionManager>)
            .collect();
        let Some((first, rest)) = managers.split_first() else {
            return Err(NexusError::NoTransport);
        };

        let transport = rest
            .iter()
            .fold(GenericSocketLayer::new(Arc::clone(first)), |layer, m| {
                layer.add_manager(Arc::clone(m))
            });
        let nexus = Arc::new(NexusLayer::new(managers, config.leave_on_disconnect));
        let bridge = Bridge::new(nexus.clone(), Arc::new(transport));

        Ok(Self {
            bridge,
            nexus,
            tcp,
            websocket,
        })
    }

    /// Binds the listeners and starts accepting clients.
    ///
    /// # Errors
    ///
    /// [`NexusError::Bridge`] wrapping the bind failure.
    pub async fn start(&self) -> Result<(), NexusError> {
        self.bridge.start().await?;
        if let Some(addr) = self.tcp_addr() {
            info!("nexus listening on tcp://{addr}");
        }
        if let Some(addr) = self.ws_addr() {
            info!("nexus listening on ws://{addr}");
        }
        Ok(())
    }

    /// Closes every client connection and stops listening.
    pub async fn stop(&self) -> Result<(), NexusError> {
        self.bridge.stop().await?;
        info!("nexus stopped");
        Ok(())
    }

    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp.as_ref().and_then(|m| m.local_addr())
    }

    pub fn ws_addr(&self) -> Option<SocketAddr> {
        self.websocket.as_ref().and_then(|m| m.local_addr())
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.nexus.channel_names()
    }

    pub fn members(&self, channel: &str) -> Vec<ClientId> {
        self.nexus.members(channel)
    }

    pub fn client_count(&self) -> usize {
        self.nexus.client_count()
    }

    /// The underlying Bridge, for attaching further application logic.
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
