//! Ordered sequential composition of layers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::bridge::Bridge;
use crate::application::layer::{Layer, StartGuard};
use crate::domain::{BridgeError, Flow, Payload, PipelineMetadata};

/// Runs a list of layers one after another.
///
/// Both directions walk the list in attachment order, feeding each layer's
/// output into the next.  A [`Flow::Halt`] from any layer stops the chain and
/// becomes the chain's result.  The `attach_inbound_layer` /
/// `attach_outbound_layer` helpers are documentation at the call site; they
/// append to the same list as `attach_layer`.
///
/// ```rust
/// use relay_bridge::{BufferStringLayer, JsonStringLayer, MultiLayer};
///
/// // bytes → text → JSON on the way in, JSON → text → bytes on the way out
/// let decode = MultiLayer::new()
///     .attach_inbound_layer(BufferStringLayer::default())
///     .attach_inbound_layer(JsonStringLayer::new());
/// assert_eq!(decode.len(), 2);
/// ```
pub struct MultiLayer {
    name: String,
    layers: Vec<Arc<dyn Layer>>,
    guard: StartGuard,
}

impl MultiLayer {
    pub fn new() -> Self {
        Self::named("multi")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layers: Vec::new(),
            guard: StartGuard::new(),
        }
    }

    pub fn attach_layer(self, layer: impl Layer + 'static) -> Self {
        self.attach_shared(Arc::new(layer))
    }

    pub fn attach_inbound_layer(self, layer: impl Layer + 'static) -> Self {
        self.attach_layer(layer)
    }

    pub fn attach_outbound_layer(self, layer: impl Layer + 'static) -> Self {
        self.attach_layer(layer)
    }

    /// Appends a layer that is also referenced elsewhere (e.g. by another chain).
    pub fn attach_shared(mut self, layer: Arc<dyn Layer>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn layers(&self) -> &[Arc<dyn Layer>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Default for MultiLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Layer for MultiLayer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, bridge: &Bridge) -> Result<(), BridgeError> {
        if !self.guard.try_start() {
            return Ok(());
        }
        for layer in &self.layers {
            layer.start(bridge).await?;
        }
        Ok(())
    }

    async fn stop(&self, bridge: &Bridge) -> Result<(), BridgeError> {
        if !self.guard.try_stop() {
            return Ok(());
        }
        for layer in &self.layers {
            layer.stop(bridge).await?;
        }
        Ok(())
    }

    async fn process_inbound(
        &self,
        payload: Payload,
        metadata: &mut PipelineMetadata,
        bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        let mut current = payload;
        for layer in &self.layers {
            match layer.process_inbound(current, metadata, bridge).await? {
                Flow::Continue(next) => current = next,
                Flow::Halt => return Ok(Flow::Halt),
            }
        }
        Ok(Flow::Continue(current))
    }

    async fn process_outbound(
        &self,
        payload: Payload,
        metadata: &mut PipelineMetadata,
        bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        let mut current = payload;
        for layer in &self.layers {
            match layer.process_outbound(current, metadata, bridge).await? {
                Flow::Continue(next) => current = next,
                Flow::Halt => return Ok(Flow::Halt),
            }
        }
        Ok(Flow::Continue(current))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    /// Counts lifecycle calls.
    #[derive(Default)]
    struct Lifecycle {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl Layer for Lifecycle {
        fn name(&self) -> &str {
            "lifecycle"
        }

        async fn start(&self, _bridge: &Bridge) -> Result<(), BridgeError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self, _bridge: &Bridge) -> Result<(), BridgeError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Halt;

    #[async_trait]
    impl Layer for Halt {
        fn name(&self) -> &str {
            "halt"
        }

        async fn process_inbound(
            &self,
            _payload: Payload,
            _metadata: &mut PipelineMetadata,
            _bridge: &Bridge,
        ) -> Result<Flow, BridgeError> {
            Ok(Flow::Halt)
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        // Arrange
        let child = Arc::new(Lifecycle::default());
        let multi = Arc::new(MultiLayer::new().attach_shared(child.clone()));
        let bridge = Bridge::symmetric(multi.clone());

        // Act: start twice through the layer, once through the bridge
        multi.start(&bridge).await.unwrap();
        multi.start(&bridge).await.unwrap();
        bridge.start().await.unwrap();
        bridge.stop().await.unwrap();
        bridge.stop().await.unwrap();

        // Assert
        assert_eq!(child.starts.load(Ordering::SeqCst), 1);
        assert_eq!(child.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_chain_is_identity() {
        let multi = MultiLayer::new();
        let bridge = Bridge::symmetric(Arc::new(MultiLayer::new()));
        let flow = multi
            .process_outbound(Payload::Json(json!(0)), &mut PipelineMetadata::outbound(), &bridge)
            .await
            .unwrap();
        assert_eq!(flow, Flow::Continue(Payload::Json(json!(0))));
    }

    #[tokio::test]
    async fn test_halt_short_circuits() {
        // Arrange: halt sits before a layer that would fail on text input
        let multi = MultiLayer::new()
            .attach_layer(Halt)
            .attach_layer(crate::BufferStringLayer::default());
        let bridge = Bridge::symmetric(Arc::new(MultiLayer::new()));

        // Act
        let flow = multi
            .process_inbound(Payload::from("text"), &mut PipelineMetadata::inbound(), &bridge)
            .await
            .unwrap();

        // Assert
        assert_eq!(flow, Flow::Halt);
    }
}
