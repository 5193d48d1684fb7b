//! Transport layer that delegates connection handling to managers.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::application::{Bridge, Layer, StartGuard, WeakBridge};
use crate::domain::{BridgeError, Flow, ListenerId, Payload, PipelineMetadata};
use crate::infrastructure::manager::{connection_listener, ConnectionEvent, ConnectionManager};
use crate::infrastructure::transport::forward_to_bridge;

const NAME: &str = "generic-socket";

/// Starts every attached [`ConnectionManager`] and wires each connection it
/// establishes into the bridge.
///
/// Outbound data goes to `metadata.socket`; there is no broadcast fallback.
pub struct GenericSocketLayer {
    managers: Vec<Arc<dyn ConnectionManager>>,
    bridge: Arc<Mutex<WeakBridge>>,
    registrations: Mutex<Vec<(usize, ListenerId)>>,
    guard: StartGuard,
}

impl GenericSocketLayer {
    pub fn new(manager: Arc<dyn ConnectionManager>) -> Self {
        Self {
            managers: vec![manager],
            bridge: Arc::new(Mutex::new(WeakBridge::new())),
            registrations: Mutex::new(Vec::new()),
            guard: StartGuard::new(),
        }
    }

    pub fn add_manager(mut self, manager: Arc<dyn ConnectionManager>) -> Self {
        self.managers.push(manager);
        self
    }

    pub fn managers(&self) -> &[Arc<dyn ConnectionManager>] {
        &self.managers
    }

    fn remove_listeners(&self) {
        let registrations = std::mem::take(&mut *self.registrations.lock());
        for (index, id) in registrations {
            self.managers[index].remove_listener(id);
        }
    }
}

#[async_trait]
impl Layer for GenericSocketLayer {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self, bridge: &Bridge) -> Result<(), BridgeError> {
        if !self.guard.try_start() {
            return Ok(());
        }
        *self.bridge.lock() = bridge.downgrade();
        for (index, manager) in self.managers.iter().enumerate() {
            let shared = Arc::clone(&self.bridge);
            let id = manager.on_connection_event(connection_listener(move |event| {
                let bridge = Arc::clone(&shared);
                async move {
                    if let ConnectionEvent::Established(socket) = event {
                        forward_to_bridge(&socket, &bridge);
                    }
                }
            }));
            self.registrations.lock().push((index, id));
        }
        for (index, manager) in self.managers.iter().enumerate() {
            debug!("{NAME}: starting manager {}", manager.name());
            if let Err(e) = manager.start().await {
                // Undo the managers already started so a later start begins clean.
                for started in &self.managers[..index] {
                    started.stop().await;
                }
                self.remove_listeners();
                self.guard.try_stop();
                return Err(BridgeError::transport(NAME, e));
            }
        }
        Ok(())
    }

    async fn stop(&self, _bridge: &Bridge) -> Result<(), BridgeError> {
        if !self.guard.try_stop() {
            return Ok(());
        }
        for manager in &self.managers {
            manager.stop().await;
        }
        self.remove_listeners();
        Ok(())
    }

    async fn process_outbound(
        &self,
        payload: Payload,
        metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        let socket = metadata
            .socket
            .clone()
            .ok_or(BridgeError::MissingTarget { layer: NAME.to_string() })?;
        socket
            .send_data(payload.clone())
            .await
            .map_err(|e| BridgeError::transport(NAME, e))?;
        Ok(Flow::Continue(payload))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
