//! Server transport layer: listens for clients and routes outbound data.
//!
//! # Outbound routing
//!
//! | metadata            | action                                   |
//! |---------------------|------------------------------------------|
//! | `socket` set        | unicast to that socket                   |
//! | `connection_id` set | unicast to the client with that id       |
//! | neither             | broadcast to every connected client      |
//!
//! An unknown `connection_id` is logged and dropped.
//!
//! Broadcast awaits every write; clients that closed in the meantime are
//! skipped.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::application::{Bridge, Layer, StartGuard, WeakBridge};
use crate::domain::{
    BridgeError, Flow, FrameMode, ListenerId, Payload, PipelineMetadata, Socket, TcpServerConfig,
    TransportError, WsServerConfig,
};
use crate::infrastructure::manager::{
    connection_listener, ConnectionEvent, ConnectionManager, ServerConnectionManager,
};
use crate::infrastructure::transport::forward_to_bridge;

pub struct ServerTransportLayer {
    name: &'static str,
    manager: ServerConnectionManager,
    bridge: Arc<Mutex<WeakBridge>>,
    registration: Mutex<Option<ListenerId>>,
    guard: StartGuard,
}

impl ServerTransportLayer {
    pub fn tcp(config: TcpServerConfig) -> Self {
        Self::with_manager("tcp-server", ServerConnectionManager::tcp(config, FrameMode::Raw))
    }

    pub fn websocket(config: WsServerConfig) -> Self {
        Self::with_manager("ws-server", ServerConnectionManager::websocket(config, FrameMode::Raw))
    }

    fn with_manager(name: &'static str, manager: ServerConnectionManager) -> Self {
        Self {
            name,
            manager,
            bridge: Arc::new(Mutex::new(WeakBridge::new())),
            registration: Mutex::new(None),
            guard: StartGuard::new(),
        }
    }

    /// Bound address once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.manager.local_addr()
    }

    pub fn client_count(&self) -> usize {
        self.manager.sockets().len()
    }

    async fn unicast(&self, socket: &Arc<dyn Socket>, payload: Payload) -> Result<(), BridgeError> {
        socket
            .send_data(payload)
            .await
            .map_err(|e| BridgeError::transport(self.name, e))
    }

    async fn broadcast(&self, payload: &Payload) {
        let sockets = self.manager.sockets();
        let writes = sockets.iter().map(|socket| socket.send_data(payload.clone()));
        for (socket, result) in sockets.iter().zip(join_all(writes).await) {
            match result {
                Ok(()) => {}
                Err(TransportError::Closed) => {
                    debug!(connection = socket.id(), "skipping closed client");
                }
                Err(e) => warn!(connection = socket.id(), "broadcast write failed: {e}"),
            }
        }
    }
}

#[async_trait]
impl Layer for ServerTransportLayer {
    fn name(&self) -> &str {
        self.name
    }

    async fn start(&self, bridge: &Bridge) -> Result<(), BridgeError> {
        if !self.guard.try_start() {
            return Ok(());
        }
        *self.bridge.lock() = bridge.downgrade();

        let shared_bridge = Arc::clone(&self.bridge);
        let id = self.manager.on_connection_event(connection_listener(move |event| {
            let bridge = Arc::clone(&shared_bridge);
            async move {
                if let ConnectionEvent::Established(socket) = event {
                    forward_to_bridge(&socket, &bridge);
                }
            }
        }));
        *self.registration.lock() = Some(id);

        if let Err(e) = self.manager.start().await {
            // Leave the layer stopped so a later start can retry the bind.
            if let Some(id) = self.registration.lock().take() {
                self.manager.remove_listener(id);
            }
            self.guard.try_stop();
            return Err(BridgeError::transport(self.name, e));
        }
        Ok(())
    }

    async fn stop(&self, _bridge: &Bridge) -> Result<(), BridgeError> {
        if !self.guard.try_stop() {
            return Ok(());
        }
        self.manager.stop().await;
        let registration = self.registration.lock().take();
        if let Some(id) = registration {
            self.manager.remove_listener(id);
        }
        Ok(())
    }

    async fn process_outbound(
        &self,
        payload: Payload,
        metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        if let Some(socket) = metadata.socket.clone() {
            self.unicast(&socket, payload.clone()).await?;
        } else if let Some(id) = metadata.connection_id.as_deref() {
            match self.manager.socket(id) {
                Some(socket) => self.unicast(&socket, payload.clone()).await?,
                None => warn!("{}: no client with id {id}; dropping payload", self.name),
            }
        } else {
            self.broadcast(&payload).await;
        }
        Ok(Flow::Continue(payload))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    async fn started_server() -> (Arc<ServerTransportLayer>, Bridge, u16) {
        let layer = Arc::new(ServerTransportLayer::tcp(TcpServerConfig::new("127.0.0.1", 0)));
        let bridge = Bridge::symmetric(layer.clone());
        bridge.start().await.unwrap();
        let port = layer.local_addr().unwrap().port();
        (layer, bridge, port)
    }

    async fn connect(port: u16) -> BufReader<TcpStream> {
        BufReader::new(TcpStream::connect(("127.0.0.1", port)).await.unwrap())
    }

    async fn wait_for_clients(layer: &ServerTransportLayer, n: usize) {
        timeout(WAIT, async {
            while layer.client_count() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        timeout(WAIT, reader.read_line(&mut line)).await.unwrap().unwrap();
        line
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        // Arrange
        let (layer, bridge, port) = started_server().await;
        let mut a = connect(port).await;
        let mut b = connect(port).await;
        wait_for_clients(&layer, 2).await;

        // Act
        bridge
            .handle_outbound_packet(Payload::from("all"), None)
            .await
            .unwrap();

        // Assert
        assert_eq!(read_line(&mut a).await, "all\n");
        assert_eq!(read_line(&mut b).await, "all\n");
        bridge.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_id_selects_one_client() {
        // Arrange
        let (layer, bridge, port) = started_server().await;
        let mut a = connect(port).await;
        wait_for_clients(&layer, 1).await;
        let mut b = connect(port).await;
        wait_for_clients(&layer, 2).await;
        let ids: Vec<String> = layer.manager.sockets().iter().map(|s| s.id().to_string()).collect();

        // Act: address each client by id
        for id in &ids {
            bridge
                .handle_outbound_packet(
                    Payload::from(format!("to-{id}")),
                    Some(PipelineMetadata::outbound().with_connection_id(id.clone())),
                )
                .await
                .unwrap();
        }

        // Assert: each client receives exactly the line addressed to it
        let got_a = read_line(&mut a).await;
        let got_b = read_line(&mut b).await;
        assert_ne!(got_a, got_b);
        assert!(ids.iter().any(|id| got_a == format!("to-{id}\n")));
        assert!(ids.iter().any(|id| got_b == format!("to-{id}\n")));
        bridge.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_connection_id_is_dropped_not_broadcast() {
        let (layer, bridge, port) = started_server().await;
        let mut a = connect(port).await;
        wait_for_clients(&layer, 1).await;

        let flow = bridge
            .handle_outbound_packet(
                Payload::from("lost"),
                Some(PipelineMetadata::outbound().with_connection_id("nope")),
            )
            .await
            .unwrap();
        bridge
            .handle_outbound_packet(Payload::from("after"), None)
            .await
            .unwrap();

        assert!(!flow.is_halt());
        assert_eq!(read_line(&mut a).await, "after\n");
        bridge.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_inbound_data_carries_source_socket() {
        // Arrange: inbound chain records the connection id it was given
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let server = Arc::new(ServerTransportLayer::tcp(TcpServerConfig::new("127.0.0.1", 0)));
        let tap = crate::TapLayer::new(move |payload, meta| {
            let _ = tx.send((payload.clone(), meta.connection_id.clone(), meta.socket.is_some()));
        });
        let bridge = Bridge::new(Arc::new(tap), server.clone());
        bridge.start().await.unwrap();
        let port = server.local_addr().unwrap().port();

        // Act
        let mut client = connect(port).await;
        tokio::io::AsyncWriteExt::write_all(client.get_mut(), b"hi\n").await.unwrap();

        // Assert
        let (payload, id, has_socket) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(payload, Payload::Bytes(b"hi".to_vec()));
        assert!(id.is_some());
        assert!(has_socket);
        bridge.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_bind_leaves_layer_restartable() {
        // Arrange: the port is taken
        let occupier = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupier.local_addr().unwrap().port();
        let layer = Arc::new(ServerTransportLayer::tcp(TcpServerConfig::new("127.0.0.1", port)));
        let bridge = Bridge::symmetric(layer.clone());
        let err = bridge.start().await.unwrap_err();
        assert!(matches!(err, BridgeError::Transport { .. }));

        // Act: free the port and try again
        drop(occupier);
        bridge.start().await.unwrap();

        // Assert
        assert_eq!(layer.local_addr().map(|a| a.port()), Some(port));
        let _client = connect(port).await;
        wait_for_clients(&layer, 1).await;
        bridge.stop().await.unwrap();
    }
}
