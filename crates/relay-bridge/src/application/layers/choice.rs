//! Runtime selection of one registered layer per payload.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::bridge::Bridge;
use crate::application::layer::{same_layer, Layer, StartGuard};
use crate::domain::{BridgeError, Flow, Payload, PipelineMetadata};

/// Maps a payload and its metadata to a registry key.
pub type Classifier = Arc<dyn Fn(&Payload, &PipelineMetadata) -> Option<String> + Send + Sync>;

/// Dispatches each payload to the layer registered under the classifier's key.
///
/// Inbound and outbound registries are independent.  With no classifier, a
/// `None` key or a key nobody registered, the payload passes through
/// unchanged.  `start`/`stop` reach every registered layer once, even if it
/// is registered under several keys or in both directions.
pub struct ChoiceLayer {
    name: String,
    classifier: Option<Classifier>,
    inbound: BTreeMap<String, Arc<dyn Layer>>,
    outbound: BTreeMap<String, Arc<dyn Layer>>,
    guard: StartGuard,
}

impl ChoiceLayer {
    pub fn new() -> Self {
        Self {
            name: "choice".to_string(),
            classifier: None,
            inbound: BTreeMap::new(),
            outbound: BTreeMap::new(),
            guard: StartGuard::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&Payload, &PipelineMetadata) -> Option<String> + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn register_inbound(mut self, key: impl Into<String>, layer: Arc<dyn Layer>) -> Self {
        self.inbound.insert(key.into(), layer);
        self
    }

    pub fn register_outbound(mut self, key: impl Into<String>, layer: Arc<dyn Layer>) -> Self {
        self.outbound.insert(key.into(), layer);
        self
    }

    /// Registers the same layer instance for both directions.
    pub fn register(self, key: impl Into<String>, layer: Arc<dyn Layer>) -> Self {
        let key = key.into();
        self.register_inbound(key.clone(), Arc::clone(&layer))
            .register_outbound(key, layer)
    }

    fn select<'a>(
        &self,
        registry: &'a BTreeMap<String, Arc<dyn Layer>>,
        payload: &Payload,
        metadata: &PipelineMetadata,
    ) -> Option<&'a Arc<dyn Layer>> {
        let classifier = self.classifier.as_ref()?;
        let key = classifier(payload, metadata)?;
        registry.get(&key)
    }

    /// Every registered layer, once per instance.
    fn unique_layers(&self) -> Vec<Arc<dyn Layer>> {
        let mut unique: Vec<Arc<dyn Layer>> = Vec::new();
        for layer in self.inbound.values().chain(self.outbound.values()) {
            if !unique.iter().any(|seen| same_layer(seen, layer)) {
                unique.push(Arc::clone(layer));
            }
        }
        unique
    }
}

impl Default for ChoiceLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Layer for ChoiceLayer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, bridge: &Bridge) -> Result<(), BridgeError> {
        if !self.guard.try_start() {
            return Ok(());
        }
        for layer in self.unique_layers() {
            layer.start(bridge).await?;
        }
        Ok(())
    }

    async fn stop(&self, bridge: &Bridge) -> Result<(), BridgeError> {
        if !self.guard.try_stop() {
            return Ok(());
        }
        for layer in self.unique_layers() {
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
        match self.select(&self.inbound, &payload, metadata).cloned() {
            Some(layer) => layer.process_inbound(payload, metadata, bridge).await,
            None => Ok(Flow::Continue(payload)),
        }
    }

    async fn process_outbound(
        &self,
        payload: Payload,
        metadata: &mut PipelineMetadata,
        bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        match self.select(&self.outbound, &payload, metadata).cloned() {
            Some(layer) => layer.process_outbound(payload, metadata, bridge).await,
            None => Ok(Flow::Continue(payload)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    /// Tags JSON objects with its own label and counts lifecycle calls.
    struct Tagger {
        label: &'static str,
        starts: AtomicUsize,
    }

    impl Tagger {
        fn new(label: &'static str) -> Arc<Self> {
            Arc::new(Self {
                label,
                starts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Layer for Tagger {
        fn name(&self) -> &str {
            self.label
        }

        async fn start(&self, _bridge: &Bridge) -> Result<(), BridgeError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn process_inbound(
            &self,
            _payload: Payload,
            _metadata: &mut PipelineMetadata,
            _bridge: &Bridge,
        ) -> Result<Flow, BridgeError> {
            Ok(Flow::Continue(Payload::Json(json!(self.label))))
        }
    }

    fn by_kind_field(payload: &Payload, _meta: &PipelineMetadata) -> Option<String> {
        payload.as_json()?.get("kind")?.as_str().map(str::to_string)
    }

    #[tokio::test]
    async fn test_dispatches_on_classifier_key() {
        // Arrange
        let choice = ChoiceLayer::new()
            .with_classifier(by_kind_field)
            .register_inbound("a", Tagger::new("A"))
            .register_inbound("b", Tagger::new("B"));
        let bridge = Bridge::symmetric(Arc::new(ChoiceLayer::new()));

        // Act
        let a = choice
            .process_inbound(
                Payload::Json(json!({"kind": "a"})),
                &mut PipelineMetadata::inbound(),
                &bridge,
            )
            .await
            .unwrap();
        let b = choice
            .process_inbound(
                Payload::Json(json!({"kind": "b"})),
                &mut PipelineMetadata::inbound(),
                &bridge,
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(a, Flow::Continue(Payload::Json(json!("A"))));
        assert_eq!(b, Flow::Continue(Payload::Json(json!("B"))));
    }

    #[tokio::test]
    async fn test_unknown_key_and_missing_classifier_pass_through() {
        let bridge = Bridge::symmetric(Arc::new(ChoiceLayer::new()));
        let input = Payload::Json(json!({"kind": "zzz"}));

        let with_classifier = ChoiceLayer::new()
            .with_classifier(by_kind_field)
            .register_inbound("a", Tagger::new("A"));
        let without_classifier = ChoiceLayer::new().register_inbound("zzz", Tagger::new("Z"));

        for choice in [with_classifier, without_classifier] {
            let flow = choice
                .process_inbound(input.clone(), &mut PipelineMetadata::inbound(), &bridge)
                .await
                .unwrap();
            assert_eq!(flow, Flow::Continue(input.clone()));
        }
    }

    #[tokio::test]
    async fn test_outbound_registry_is_independent() {
        let choice = ChoiceLayer::new()
            .with_classifier(|_, _| Some("a".to_string()))
            .register_inbound("a", Tagger::new("A"));
        let bridge = Bridge::symmetric(Arc::new(ChoiceLayer::new()));

        let flow = choice
            .process_outbound(Payload::from("x"), &mut PipelineMetadata::outbound(), &bridge)
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue(Payload::from("x")));
    }

    #[tokio::test]
    async fn test_layer_registered_twice_is_started_once() {
        // Arrange: one instance under two keys in both directions
        let shared = Tagger::new("S");
        let other = Tagger::new("O");
        let choice = Arc::new(
            ChoiceLayer::new()
                .register("x", shared.clone())
                .register("y", shared.clone())
                .register_outbound("z", other.clone()),
        );
        let bridge = Bridge::symmetric(choice.clone());

        // Act
        bridge.start().await.unwrap();

        // Assert
        assert_eq!(shared.starts.load(Ordering::SeqCst), 1);
        assert_eq!(other.starts.load(Ordering::SeqCst), 1);
    }
}
