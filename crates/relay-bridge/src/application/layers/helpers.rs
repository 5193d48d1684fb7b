//! Small utility layers: echo-back and tap.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::application::bridge::Bridge;
use crate::application::layer::Layer;
use crate::domain::{BridgeError, Flow, Payload, PipelineMetadata};

/// Re-injects every inbound payload as an outbound packet.
///
/// The reply keeps the inbound metadata (socket, connection id, party), so a
/// server transport answers the connection the data arrived on.  The
/// original payload continues down the inbound chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoLayer;

#[async_trait]
impl Layer for EchoLayer {
    fn name(&self) -> &str {
        "echo"
    }

    async fn process_inbound(
        &self,
        payload: Payload,
        metadata: &mut PipelineMetadata,
        bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        debug!("echoing {} payload", payload.kind());
        bridge
            .handle_outbound_packet(payload.clone(), Some(metadata.clone()))
            .await?;
        Ok(Flow::Continue(payload))
    }
}

type TapFn = Arc<dyn Fn(&Payload, &PipelineMetadata) + Send + Sync>;

/// Calls a closure with every payload it sees and passes the payload on.
///
/// Use [`PipelineMetadata::direction`] inside the closure to tell the chains
/// apart when the same tap sits in both.
#[derive(Clone)]
pub struct TapLayer {
    name: String,
    tap: TapFn,
}

impl TapLayer {
    pub fn new<F>(tap: F) -> Self
    where
        F: Fn(&Payload, &PipelineMetadata) + Send + Sync + 'static,
    {
        Self {
            name: "tap".to_string(),
            tap: Arc::new(tap),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Layer for TapLayer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_inbound(
        &self,
        payload: Payload,
        metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        (self.tap)(&payload, metadata);
        Ok(Flow::Continue(payload))
    }

    async fn process_outbound(
        &self,
        payload: Payload,
        metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        (self.tap)(&payload, metadata);
        Ok(Flow::Continue(payload))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::domain::Direction;
    use crate::MultiLayer;

    #[tokio::test]
    async fn test_echo_reinjects_into_outbound_chain() {
        // Arrange: inbound = echo, outbound = tap recording what it sees
        let seen: Arc<Mutex<Vec<(Direction, Payload)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let outbound = TapLayer::new(move |p, m| sink.lock().push((m.direction(), p.clone())));
        let bridge = Bridge::new(Arc::new(EchoLayer), Arc::new(outbound));

        // Act
        let flow = bridge
            .handle_inbound_packet(Payload::from("ping"), None)
            .await
            .unwrap();

        // Assert
        assert_eq!(flow, Flow::Continue(Payload::from("ping")));
        assert_eq!(
            *seen.lock(),
            vec![(Direction::Outbound, Payload::from("ping"))]
        );
    }

    #[tokio::test]
    async fn test_tap_sees_both_directions() {
        let seen: Arc<Mutex<Vec<Direction>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let tap = TapLayer::new(move |_, m| sink.lock().push(m.direction()));
        let bridge = Bridge::symmetric(Arc::new(MultiLayer::new().attach_layer(tap)));

        bridge.handle_inbound_packet(Payload::from("a"), None).await.unwrap();
        bridge.handle_outbound_packet(Payload::from("b"), None).await.unwrap();

        assert_eq!(*seen.lock(), vec![Direction::Inbound, Direction::Outbound]);
    }
}
