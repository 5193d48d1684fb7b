//! Party addressing: wraps outbound JSON in a `{id, fromParty, toParty, payload}`
//! envelope and unwraps it on the way in.
//!
//! Several logical endpoints can share one physical transport this way; the
//! receiving side finds the addressing in [`PipelineMetadata::party`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::application::bridge::Bridge;
use crate::application::layer::Layer;
use crate::domain::{BridgeError, Flow, PartyInfo, Payload, PayloadKind, PipelineMetadata};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartyEnvelope {
    id: String,
    from_party: String,
    to_party: String,
    payload: Value,
}

pub struct PartyLayer {
    local_party: String,
    default_peer: Option<String>,
}

impl PartyLayer {
    pub const NAME: &'static str = "party";

    /// `local_party` is written as `fromParty` on every outbound envelope.
    pub fn new(local_party: impl Into<String>) -> Self {
        Self {
            local_party: local_party.into(),
            default_peer: None,
        }
    }

    /// Destination used when the outbound metadata names none.
    pub fn with_default_peer(mut self, peer: impl Into<String>) -> Self {
        self.default_peer = Some(peer.into());
        self
    }

    pub fn local_party(&self) -> &str {
        &self.local_party
    }
}

#[async_trait]
impl Layer for PartyLayer {
    fn name(&self) -> &str {
        Self::NAME
    }

    /// Unwraps the envelope and records its addressing in `metadata.party`.
    async fn process_inbound(
        &self,
        payload: Payload,
        metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        let Payload::Json(value) = payload else {
            return Err(BridgeError::unexpected(Self::NAME, PayloadKind::Json, payload.kind()));
        };
        let envelope: PartyEnvelope =
            serde_json::from_value(value).map_err(|source| BridgeError::Encoding {
                layer: Self::NAME.into(),
                source,
            })?;
        metadata.party = Some(PartyInfo {
            id: envelope.id,
            from_party: envelope.from_party,
            to_party: envelope.to_party,
        });
        Ok(Flow::Continue(Payload::Json(envelope.payload)))
    }

    /// Wraps the payload for `metadata.party.to_party`, falling back to the
    /// default peer.
    async fn process_outbound(
        &self,
        payload: Payload,
        metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        let Payload::Json(value) = payload else {
            return Err(BridgeError::unexpected(Self::NAME, PayloadKind::Json, payload.kind()));
        };
        let to_party = metadata
            .party
            .as_ref()
            .map(|p| p.to_party.clone())
            .or_else(|| self.default_peer.clone())
            .ok_or_else(|| BridgeError::MissingParty {
                layer: Self::NAME.into(),
            })?;

        let envelope = PartyEnvelope {
            id: Uuid::new_v4().to_string(),
            from_party: self.local_party.clone(),
            to_party,
            payload: value,
        };
        metadata.party = Some(PartyInfo {
            id: envelope.id.clone(),
            from_party: envelope.from_party.clone(),
            to_party: envelope.to_party.clone(),
        });
        let wrapped = serde_json::to_value(&envelope).map_err(|source| BridgeError::Encoding {
            layer: Self::NAME.into(),
            source,
        })?;
        Ok(Flow::Continue(Payload::Json(wrapped)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    fn bridge() -> Bridge {
        Bridge::symmetric(Arc::new(PartyLayer::new("unused")))
    }

    #[tokio::test]
    async fn test_outbound_envelope_shape() {
        // Arrange
        let layer = PartyLayer::new("alice").with_default_peer("bob");
        let mut meta = PipelineMetadata::outbound();

        // Act
        let flow = layer
            .process_outbound(Payload::Json(json!({"n": 1})), &mut meta, &bridge())
            .await
            .unwrap();

        // Assert
        let Some(Payload::Json(wrapped)) = flow.into_payload() else {
            panic!("expected a JSON envelope");
        };
        assert_eq!(wrapped["fromParty"], json!("alice"));
        assert_eq!(wrapped["toParty"], json!("bob"));
        assert_eq!(wrapped["payload"], json!({"n": 1}));
        assert!(wrapped["id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn test_metadata_destination_overrides_default_peer() {
        let layer = PartyLayer::new("alice").with_default_peer("bob");
        let mut meta = PipelineMetadata::outbound().with_party(PartyInfo {
            id: String::new(),
            from_party: String::new(),
            to_party: "carol".into(),
        });

        let flow = layer
            .process_outbound(Payload::Json(json!(null)), &mut meta, &bridge())
            .await
            .unwrap();

        let wrapped = flow.into_payload().and_then(|p| p.as_json().cloned()).unwrap();
        assert_eq!(wrapped["toParty"], json!("carol"));
    }

    #[tokio::test]
    async fn test_missing_destination_is_an_error() {
        let layer = PartyLayer::new("alice");
        let err = layer
            .process_outbound(
                Payload::Json(json!(1)),
                &mut PipelineMetadata::outbound(),
                &bridge(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::MissingParty { .. }));
    }

    #[tokio::test]
    async fn test_inbound_rejects_non_envelope() {
        let layer = PartyLayer::new("bob");
        let err = layer
            .process_inbound(
                Payload::Json(json!({"x": 1})),
                &mut PipelineMetadata::inbound(),
                &bridge(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Encoding { .. }));
    }
}
