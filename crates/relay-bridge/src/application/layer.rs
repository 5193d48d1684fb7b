//! The [`Layer`] contract.
//!
//! A layer is a unit of transformation with an optional lifecycle:
//!
//! ```text
//! constructed → start(bridge) → process_inbound / process_outbound … → stop(bridge)
//! ```
//!
//! Every method has a default, so a layer only implements the direction it
//! cares about.  The defaults pass the payload through unchanged and make
//! `start`/`stop` no-ops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::bridge::Bridge;
use crate::domain::{BridgeError, Flow, Payload, PipelineMetadata};

/// A composable inbound/outbound processing stage.
///
/// Layers receive the [`Bridge`] on every call so they can re-inject packets
/// (`bridge.handle_outbound_packet(..)`) without holding a reference to it.
/// Long-lived callbacks that outlive a call should keep a
/// [`WeakBridge`](crate::WeakBridge) instead.
///
/// Errors are returned, not handled: the Bridge routes every `Err` through
/// its error handler exactly once.
#[async_trait]
pub trait Layer: Send + Sync {
    /// Short name used in logs and in [`BridgeError::layer`].
    fn name(&self) -> &str;

    /// Called once when the owning Bridge starts.  Must be idempotent.
    async fn start(&self, _bridge: &Bridge) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn stop(&self, _bridge: &Bridge) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn process_inbound(
        &self,
        payload: Payload,
        _metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        Ok(Flow::Continue(payload))
    }

    async fn process_outbound(
        &self,
        payload: Payload,
        _metadata: &mut PipelineMetadata,
        _bridge: &Bridge,
    ) -> Result<Flow, BridgeError> {
        Ok(Flow::Continue(payload))
    }
}

/// Compares two layer handles by identity.
pub(crate) fn same_layer(a: &Arc<dyn Layer>, b: &Arc<dyn Layer>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// Start/stop latch for stateful layers.
///
/// `try_start` returns `true` only on the transition from stopped to started,
/// so a layer reachable through several parents is started once.
#[derive(Debug, Default)]
pub struct StartGuard(AtomicBool);

impl StartGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_start(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn try_stop(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_started(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
