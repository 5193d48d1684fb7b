//! Stateless converter layers.
//!
//! | layer              | inbound        | outbound       |
//! |--------------------|----------------|----------------|
//! | `BufferStringLayer`| bytes → text   | text → bytes   |
//! | `JsonStringLayer`  | text → JSON    | JSON → text    |
//!
//! `JsonStringLayer` can be reversed for pipelines that receive JSON values
//! and emit text.  When a converter is built with a default value, a payload
//! that fails to convert is replaced by the default instead of raising.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::application::bridge::Bridge;
use crate::application::layer::Layer;
use crate::domain::{BridgeError, Flow, Payload, PayloadKind, PipelineMetadata, TextEncoding};

// ── Bytes ↔ text ──────────────────────────────────────────────────────────────

pub struct BufferStringLayer {
    encoding: TextEncoding,
    default: Option<Payload>,
}

impl BufferStringLayer {
    pub const NAME: &'static str = "buffer-string";

    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            default: None,
        }
    }

    /// Replaces payloads that fail to decode or encode with `default`.
    pub fn with_default(mut self, default: impl Into<Payload>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<String, BridgeError> {
        match self.encoding {
            TextEncoding::Utf8 => String::from_utf8(bytes).map_err(|_| BridgeError::TextDecoding {
                layer: Self::NAME.into(),
                encoding: self.encoding,
            }),
            TextEncoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }

    fn encode(&self, text: String) -> Result<Vec<u8>, BridgeError> {
        match self.encoding {
            TextEncoding::Utf8 => Ok(text.into_bytes()),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)))
                .collect::<Result<Vec<u8>, _>>()
                .map_err(|_| BridgeError::TextEncoding {
                    layer: Self::NAME.into(),
                    encoding: self.encoding,
                }),
        }
    }

    fn recover(&self, err: BridgeError) -> Result<Flow, BridgeError> {
        match &self.default {
            Some(default) => {
                debug!("{err}; substituting default");
                Ok(Flow::Continue(default.clone()))
            }
            None => Err(err),
        }
    }
}

impl Default for BufferStringLayer {
    fn default() -> Self {
        Self::new(TextEncoding::Utf8)
    }
}

#[async_trait]
impl Layer for BufferStringLayer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn process_inbound(
        &self,
        payload: Payload,
        _metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        let Payload::Bytes(bytes) = payload else {
            return Err(BridgeError::unexpected(Self::NAME, PayloadKind::Bytes, payload.kind()));
        };
        match self.decode(bytes) {
            Ok(text) => Ok(Flow::Continue(Payload::Text(text))),
            Err(err) => self.recover(err),
        }
    }

    async fn process_outbound(
        &self,
        payload: Payload,
        _metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        let Payload::Text(text) = payload else {
            return Err(BridgeError::unexpected(Self::NAME, PayloadKind::Text, payload.kind()));
        };
        match self.encode(text) {
            Ok(bytes) => Ok(Flow::Continue(Payload::Bytes(bytes))),
            Err(err) => self.recover(err),
        }
    }
}

// ── Text ↔ JSON ───────────────────────────────────────────────────────────────

/// Which direction parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonMode {
    /// Inbound parses text, outbound serializes JSON.
    #[default]
    ParseInbound,
    /// Inbound serializes JSON, outbound parses text.
    ParseOutbound,
}

pub struct JsonStringLayer {
    mode: JsonMode,
    default: Option<Value>,
}

impl JsonStringLayer {
    pub const NAME: &'static str = "json-string";

    pub fn new() -> Self {
        Self::with_mode(JsonMode::ParseInbound)
    }

    pub fn with_mode(mode: JsonMode) -> Self {
        Self {
            mode,
            default: None,
        }
    }

    /// Value returned when text fails to parse.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn mode(&self) -> JsonMode {
        self.mode
    }

    fn parse(&self, payload: Payload) -> Result<Flow, BridgeError> {
        let Payload::Text(text) = payload else {
            return Err(BridgeError::unexpected(Self::NAME, PayloadKind::Text, payload.kind()));
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Ok(Flow::Continue(Payload::Json(value))),
            Err(source) => match &self.default {
                Some(default) => {
                    debug!("[{}] unparsable text; substituting default: {source}", Self::NAME);
                    Ok(Flow::Continue(Payload::Json(default.clone())))
                }
                None => Err(BridgeError::Encoding {
                    layer: Self::NAME.into(),
                    source,
                }),
            },
        }
    }

    fn serialize(&self, payload: Payload) -> Result<Flow, BridgeError> {
        let Payload::Json(value) = payload else {
            return Err(BridgeError::unexpected(Self::NAME, PayloadKind::Json, payload.kind()));
        };
        serde_json::to_string(&value)
            .map(|text| Flow::Continue(Payload::Text(text)))
            .map_err(|source| BridgeError::Encoding {
                layer: Self::NAME.into(),
                source,
            })
    }
}

impl Default for JsonStringLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Layer for JsonStringLayer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn process_inbound(
        &self,
        payload: Payload,
        _metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        match self.mode {
            JsonMode::ParseInbound => self.parse(payload),
            JsonMode::ParseOutbound => self.serialize(payload),
        }
    }

    async fn process_outbound(
        &self,
        payload: Payload,
        _metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        match self.mode {
            JsonMode::ParseInbound => self.serialize(payload),
            JsonMode::ParseOutbound => self.parse(payload),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    fn bridge() -> Bridge {
        Bridge::symmetric(Arc::new(JsonStringLayer::new()))
    }

    async fn inbound(layer: &dyn Layer, payload: Payload) -> Result<Flow, BridgeError> {
        layer
            .process_inbound(payload, &mut PipelineMetadata::inbound(), &bridge())
            .await
    }

    async fn outbound(layer: &dyn Layer, payload: Payload) -> Result<Flow, BridgeError> {
        layer
            .process_outbound(payload, &mut PipelineMetadata::outbound(), &bridge())
            .await
    }

    #[tokio::test]
    async fn test_utf8_bytes_decode_to_text() {
        let layer = BufferStringLayer::default();
        let flow = inbound(&layer, Payload::from("héllo".as_bytes())).await.unwrap();
        assert_eq!(flow, Flow::Continue(Payload::Text("héllo".into())));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_an_error_without_default() {
        let layer = BufferStringLayer::default();
        let err = inbound(&layer, Payload::Bytes(vec![0xff, 0xfe])).await.unwrap_err();
        assert!(matches!(err, BridgeError::TextDecoding { .. }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_uses_default_when_configured() {
        let layer = BufferStringLayer::default().with_default("");
        let flow = inbound(&layer, Payload::Bytes(vec![0xff])).await.unwrap();
        assert_eq!(flow, Flow::Continue(Payload::Text(String::new())));
    }

    #[tokio::test]
    async fn test_latin1_maps_every_byte() {
        // Arrange: all 256 byte values
        let layer = BufferStringLayer::new(TextEncoding::Latin1);
        let bytes: Vec<u8> = (0..=255).collect();

        // Act
        let text = inbound(&layer, Payload::Bytes(bytes.clone())).await.unwrap();
        let back = outbound(&layer, text.into_payload().unwrap()).await.unwrap();

        // Assert
        assert_eq!(back, Flow::Continue(Payload::Bytes(bytes)));
    }

    #[tokio::test]
    async fn test_latin1_rejects_wide_characters() {
        let layer = BufferStringLayer::new(TextEncoding::Latin1);
        let err = outbound(&layer, Payload::from("€")).await.unwrap_err();
        assert!(matches!(err, BridgeError::TextEncoding { .. }));
    }

    #[tokio::test]
    async fn test_wrong_variant_names_expected_kind() {
        let layer = BufferStringLayer::default();
        let err = inbound(&layer, Payload::from("already text")).await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::UnexpectedPayload {
                expected: PayloadKind::Bytes,
                found: PayloadKind::Text,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_json_parse_and_serialize() {
        let layer = JsonStringLayer::new();

        let parsed = inbound(&layer, Payload::from(r#"{"hello":"world"}"#)).await.unwrap();
        let text = outbound(&layer, Payload::Json(json!([1, 2]))).await.unwrap();

        assert_eq!(parsed, Flow::Continue(Payload::Json(json!({"hello": "world"}))));
        assert_eq!(text, Flow::Continue(Payload::Text("[1,2]".into())));
    }

    #[tokio::test]
    async fn test_malformed_json_without_default_is_encoding_error() {
        let layer = JsonStringLayer::new();
        let err = inbound(&layer, Payload::from("{nope")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Encoding { .. }));
        assert_eq!(err.layer(), "json-string");
    }

    #[tokio::test]
    async fn test_malformed_json_with_default_recovers() {
        let layer = JsonStringLayer::new().with_default(json!({}));
        let flow = inbound(&layer, Payload::from("{nope")).await.unwrap();
        assert_eq!(flow, Flow::Continue(Payload::Json(json!({}))));
    }

    #[tokio::test]
    async fn test_reversed_mode_swaps_directions() {
        let layer = JsonStringLayer::with_mode(JsonMode::ParseOutbound);

        let text = inbound(&layer, Payload::Json(json!(true))).await.unwrap();
        let value = outbound(&layer, Payload::from("false")).await.unwrap();

        assert_eq!(text, Flow::Continue(Payload::Text("true".into())));
        assert_eq!(value, Flow::Continue(Payload::Json(json!(false))));
    }
}
