//! Client transport layer with automatic reconnect.
//!
//! # Reconnect policy
//!
//! - `start` tries to connect once; on failure it logs and leaves a
//!   background task retrying every `reconnect_interval`.
//! - When an established connection drops unexpectedly the layer reconnects
//!   immediately, then retries every `reconnect_interval` until it succeeds
//!   or the layer is stopped.
//! - An outbound send on a disconnected layer connects first.  The connect
//!   runs under a single async mutex, so concurrent senders share one
//!   in-flight attempt and never open duplicate sockets.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::{Bridge, Layer, WeakBridge};
use crate::domain::{
    BridgeError, Flow, FrameMode, Payload, PipelineMetadata, Socket, TcpClientConfig,
    TransportError, WsClientConfig,
};
use crate::infrastructure::connection::Connection;
use crate::infrastructure::manager::ClientTarget;
use crate::infrastructure::transport::forward_to_bridge;

struct ClientState {
    name: &'static str,
    target: ClientTarget,
    current: tokio::sync::Mutex<Option<Arc<Connection>>>,
    bridge: Arc<Mutex<WeakBridge>>,
    running: AtomicBool,
    attempts: AtomicUsize,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

/// Writes outbound payloads to a single dialed connection (raw frames).
pub struct ClientTransportLayer {
    state: Arc<ClientState>,
}

impl ClientTransportLayer {
    pub fn tcp(config: TcpClientConfig) -> Self {
        Self::with_target("tcp-client", ClientTarget::Tcp(config))
    }

    pub fn websocket(config: WsClientConfig) -> Self {
        Self::with_target("ws-client", ClientTarget::WebSocket(config))
    }

    fn with_target(name: &'static str, target: ClientTarget) -> Self {
        Self {
            state: Arc::new(ClientState {
                name,
                target,
                current: tokio::sync::Mutex::new(None),
                bridge: Arc::new(Mutex::new(WeakBridge::new())),
                running: AtomicBool::new(false),
                attempts: AtomicUsize::new(0),
                reconnect_task: Mutex::new(None),
            }),
        }
    }

    /// Number of dial attempts made so far, successful or not.
    pub fn connect_attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// The live connection, if any.
    pub fn socket(&self) -> Option<Arc<dyn Socket>> {
        let current = self.state.current.try_lock().ok()?;
        current
            .as_ref()
            .filter(|conn| !conn.is_closed())
            .map(|conn| Arc::clone(conn) as Arc<dyn Socket>)
    }
}

/// Returns the live connection, dialing one if there is none.
async fn ensure_connected(state: &Arc<ClientState>) -> Result<Arc<Connection>, TransportError> {
    let mut current = state.current.lock().await;
    if let Some(conn) = current.as_ref() {
        if !conn.is_closed() {
            return Ok(Arc::clone(conn));
        }
    }

    state.attempts.fetch_add(1, Ordering::SeqCst);
    debug!("{} dialing {}", state.name, state.target.describe());
    let conn = state.target.connect(FrameMode::Raw).await?;
    info!("{} connected to {}", state.name, state.target.describe());

    let socket: Arc<dyn Socket> = conn.clone();
    forward_to_bridge(&socket, &state.bridge);
    conn.activate();
    spawn_close_watch(Arc::clone(state), Arc::clone(&conn));

    *current = Some(Arc::clone(&conn));
    Ok(conn)
}

fn spawn_close_watch(state: Arc<ClientState>, conn: Arc<Connection>) {
    tokio::spawn(async move {
        conn.closed().await;
        if state.running.load(Ordering::SeqCst) {
            warn!("{} lost connection to {}; reconnecting", state.name, state.target.describe());
            spawn_reconnect(state);
        }
    });
}

fn spawn_reconnect(state: Arc<ClientState>) {
    let task_state = Arc::clone(&state);
    let handle = tokio::spawn(async move {
        let interval = task_state.target.reconnect_interval();
        while task_state.running.load(Ordering::SeqCst) {
            match ensure_connected(&task_state).await {
                Ok(_) => return,
                Err(e) => {
                    warn!("{}: {e}; retrying in {interval:?}", task_state.name);
                    tokio::time::sleep(interval).await;
                }
            }
        }
    });
    if let Some(previous) = state.reconnect_task.lock().replace(handle) {
        previous.abort();
    }
}

#[async_trait]
impl Layer for ClientTransportLayer {
    fn name(&self) -> &str {
        self.state.name
    }

    async fn start(&self, bridge: &Bridge) -> Result<(), BridgeError> {
        if self.state.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.state.bridge.lock() = bridge.downgrade();
        if let Err(e) = ensure_connected(&self.state).await {
            warn!("{}: initial connect failed: {e}", self.state.name);
            spawn_reconnect(Arc::clone(&self.state));
        }
        Ok(())
    }

    async fn stop(&self, _bridge: &Bridge) -> Result<(), BridgeError> {
        if !self.state.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let reconnect = self.state.reconnect_task.lock().take();
        if let Some(task) = reconnect {
            task.abort();
        }
        let current = self.state.current.lock().await.take();
        if let Some(conn) = current {
            conn.close().await;
        }
        Ok(())
    }

    async fn process_outbound(
        &self,
        payload: Payload,
        _metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        let conn = ensure_connected(&self.state)
            .await
            .map_err(|e| BridgeError::transport(self.state.name, e))?;
        conn.send_data(payload.clone())
            .await
            .map_err(|e| BridgeError::transport(self.state.name, e))?;
        Ok(Flow::Continue(payload))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
