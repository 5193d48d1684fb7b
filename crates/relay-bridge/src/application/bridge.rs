//! The Bridge: one inbound layer, one outbound layer and an error handler.
//!
//! External events enter the pipeline through exactly two doors:
//!
//! - [`Bridge::handle_inbound_packet`] – data read from a transport, or any
//!   other event flowing *into* the application.
//! - [`Bridge::handle_outbound_packet`] – data the application wants to send.
//!
//! Each call stamps the direction onto the metadata, runs the corresponding
//! layer (usually a [`MultiLayer`](crate::MultiLayer)) and routes any error
//! through the error handler.  The Bridge is a cheap, cloneable handle.

use std::sync::{Arc, Weak};

use tracing::{debug, info};

use crate::application::error_handler::{ErrorDisposition, ErrorHandler};
use crate::application::layer::{same_layer, Layer};
use crate::domain::{BridgeError, Direction, Flow, Payload, PipelineMetadata};

struct BridgeInner {
    inbound: Arc<dyn Layer>,
    outbound: Arc<dyn Layer>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
}

/// Dispatch point binding an inbound and an outbound layer into a pipeline.
///
/// # Examples
///
/// ```rust
/// # tokio_test::block_on(async {
/// use std::sync::Arc;
/// use relay_bridge::{Bridge, JsonStringLayer, Payload};
/// use serde_json::json;
///
/// let bridge = Bridge::symmetric(Arc::new(JsonStringLayer::new()));
/// let flow = bridge
///     .handle_inbound_packet(Payload::from(r#"{"a":1}"#), None)
///     .await
///     .unwrap();
/// assert_eq!(flow.into_payload(), Some(Payload::Json(json!({"a": 1}))));
/// # });
/// ```
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

/// Non-owning handle to a [`Bridge`], held by long-lived callbacks.
#[derive(Clone, Default)]
pub struct WeakBridge {
    inner: Weak<BridgeInner>,
}

impl WeakBridge {
    /// A handle that never upgrades; placeholder until a layer is started.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upgrade(&self) -> Option<Bridge> {
        self.inner.upgrade().map(|inner| Bridge { inner })
    }
}

impl Bridge {
    pub fn new(inbound: Arc<dyn Layer>, outbound: Arc<dyn Layer>) -> Self {
        Self::build(inbound, outbound, None)
    }

    pub fn with_error_handler(
        inbound: Arc<dyn Layer>,
        outbound: Arc<dyn Layer>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self::build(inbound, outbound, Some(error_handler))
    }

    /// Uses the same layer instance for both directions.
    pub fn symmetric(layer: Arc<dyn Layer>) -> Self {
        Self::new(Arc::clone(&layer), layer)
    }

    fn build(
        inbound: Arc<dyn Layer>,
        outbound: Arc<dyn Layer>,
        error_handler: Option<Arc<dyn ErrorHandler>>,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                inbound,
                outbound,
                error_handler,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakBridge {
        WeakBridge {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn inbound_layer(&self) -> &Arc<dyn Layer> {
        &self.inner.inbound
    }

    pub fn outbound_layer(&self) -> &Arc<dyn Layer> {
        &self.inner.outbound
    }

    fn is_symmetric(&self) -> bool {
        same_layer(&self.inner.inbound, &self.inner.outbound)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Starts the inbound layer, then the outbound layer unless it is the same
    /// instance.
    ///
    /// # Errors
    ///
    /// Returns the first layer start error.
    pub async fn start(&self) -> Result<(), BridgeError> {
        self.inner.inbound.start(self).await?;
        if !self.is_symmetric() {
            self.inner.outbound.start(self).await?;
        }
        info!(
            inbound = self.inner.inbound.name(),
            outbound = self.inner.outbound.name(),
            "bridge started"
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), BridgeError> {
        self.inner.inbound.stop(self).await?;
        if !self.is_symmetric() {
            self.inner.outbound.stop(self).await?;
        }
        info!("bridge stopped");
        Ok(())
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Runs `payload` through the inbound layer.
    ///
    /// Missing metadata is created; supplied metadata has its direction reset
    /// to inbound.
    ///
    /// # Errors
    ///
    /// A layer error that the error handler does not claim.
    pub async fn handle_inbound_packet(
        &self,
        payload: Payload,
        metadata: Option<PipelineMetadata>,
    ) -> Result<Flow, BridgeError> {
        let mut metadata = metadata.unwrap_or_else(PipelineMetadata::inbound);
        metadata.set_direction(Direction::Inbound);

        let layer = &self.inner.inbound;
        match layer.process_inbound(payload, &mut metadata, self).await {
            Ok(flow) => Ok(flow),
            Err(err) => self.handle_error(err, Some(layer.as_ref())).map(|()| Flow::Halt),
        }
    }

    /// Runs `payload` through the outbound layer.
    ///
    /// # Errors
    ///
    /// A layer error that the error handler does not claim.
    pub async fn handle_outbound_packet(
        &self,
        payload: Payload,
        metadata: Option<PipelineMetadata>,
    ) -> Result<Flow, BridgeError> {
        let mut metadata = metadata.unwrap_or_else(PipelineMetadata::outbound);
        metadata.set_direction(Direction::Outbound);

        let layer = &self.inner.outbound;
        match layer.process_outbound(payload, &mut metadata, self).await {
            Ok(flow) => Ok(flow),
            Err(err) => self.handle_error(err, Some(layer.as_ref())).map(|()| Flow::Halt),
        }
    }

    /// Offers `err` to the error handler.
    ///
    /// # Errors
    ///
    /// Returns `err` unchanged when there is no handler or it declines.
    pub fn handle_error(
        &self,
        err: BridgeError,
        layer: Option<&dyn Layer>,
    ) -> Result<(), BridgeError> {
        let Some(handler) = &self.inner.error_handler else {
            return Err(err);
        };
        match handler.handle(&err) {
            ErrorDisposition::Handled => {
                debug!(
                    layer = layer.map(|l| l.name()).unwrap_or_else(|| err.layer()),
                    "pipeline error handled: {err}"
                );
                Ok(())
            }
            ErrorDisposition::NotHandled => Err(err),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::error_handler::MockErrorHandler;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records lifecycle calls and the direction it was invoked with.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Layer for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn start(&self, _bridge: &Bridge) -> Result<(), BridgeError> {
            self.events.lock().push("start".into());
            Ok(())
        }

        async fn stop(&self, _bridge: &Bridge) -> Result<(), BridgeError> {
            self.events.lock().push("stop".into());
            Ok(())
        }

        async fn process_inbound(
            &self,
            payload: Payload,
            metadata: &mut PipelineMetadata,
            _bridge: &Bridge,
        ) -> Result<Flow, BridgeError> {
            self.events.lock().push(format!("in:{}", metadata.direction()));
            Ok(Flow::Continue(payload))
        }

        async fn process_outbound(
            &self,
            payload: Payload,
            metadata: &mut PipelineMetadata,
            _bridge: &Bridge,
        ) -> Result<Flow, BridgeError> {
            self.events.lock().push(format!("out:{}", metadata.direction()));
            Ok(Flow::Continue(payload))
        }
    }

    struct Failing;

    #[async_trait]
    impl Layer for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn process_inbound(
            &self,
            _payload: Payload,
            _metadata: &mut PipelineMetadata,
            _bridge: &Bridge,
        ) -> Result<Flow, BridgeError> {
            Err(BridgeError::failure("failing", "boom"))
        }
    }

    #[tokio::test]
    async fn test_symmetric_bridge_starts_shared_layer_once() {
        // Arrange
        let layer = Arc::new(Recorder::default());
        let bridge = Bridge::symmetric(layer.clone());

        // Act
        bridge.start().await.unwrap();
        bridge.stop().await.unwrap();

        // Assert
        assert_eq!(*layer.events.lock(), vec!["start", "stop"]);
    }

    #[tokio::test]
    async fn test_distinct_layers_are_both_started() {
        let inbound = Arc::new(Recorder::default());
        let outbound = Arc::new(Recorder::default());
        let bridge = Bridge::new(inbound.clone(), outbound.clone());

        bridge.start().await.unwrap();

        assert_eq!(*inbound.events.lock(), vec!["start"]);
        assert_eq!(*outbound.events.lock(), vec!["start"]);
    }

    #[tokio::test]
    async fn test_direction_is_stamped_even_when_caller_supplies_metadata() {
        // Arrange: caller hands outbound metadata to the inbound door
        let layer = Arc::new(Recorder::default());
        let bridge = Bridge::symmetric(layer.clone());

        // Act
        bridge
            .handle_inbound_packet(Payload::from("x"), Some(PipelineMetadata::outbound()))
            .await
            .unwrap();
        bridge
            .handle_outbound_packet(Payload::from("y"), None)
            .await
            .unwrap();

        // Assert
        assert_eq!(*layer.events.lock(), vec!["in:inbound", "out:outbound"]);
    }

    #[tokio::test]
    async fn test_unhandled_error_is_returned_to_caller() {
        let bridge = Bridge::new(Arc::new(Failing), Arc::new(Recorder::default()));

        let result = bridge.handle_inbound_packet(Payload::from("x"), None).await;

        let err = result.unwrap_err();
        assert_eq!(err.layer(), "failing");
    }

    #[tokio::test]
    async fn test_handled_error_halts_and_is_offered_once() {
        // Arrange
        let mut handler = MockErrorHandler::new();
        handler
            .expect_handle()
            .withf(|err| err.layer() == "failing")
            .times(1)
            .return_const(ErrorDisposition::Handled);
        let bridge = Bridge::with_error_handler(
            Arc::new(Failing),
            Arc::new(Recorder::default()),
            Arc::new(handler),
        );

        // Act
        let flow = bridge
            .handle_inbound_packet(Payload::from("x"), None)
            .await
            .unwrap();

        // Assert
        assert_eq!(flow, Flow::Halt);
    }

    #[tokio::test]
    async fn test_declining_handler_rethrows() {
        let mut handler = MockErrorHandler::new();
        handler
            .expect_handle()
            .times(1)
            .return_const(ErrorDisposition::NotHandled);
        let bridge = Bridge::with_error_handler(
            Arc::new(Failing),
            Arc::new(Recorder::default()),
            Arc::new(handler),
        );

        let result = bridge.handle_inbound_packet(Payload::from("x"), None).await;

        assert!(result.is_err());
    }

    #[test]
    fn test_weak_bridge_does_not_keep_bridge_alive() {
        let bridge = Bridge::symmetric(Arc::new(Recorder::default()));
        let weak = bridge.downgrade();
        assert!(weak.upgrade().is_some());
        drop(bridge);
        assert!(weak.upgrade().is_none());
        assert!(WeakBridge::new().upgrade().is_none());
    }
}
