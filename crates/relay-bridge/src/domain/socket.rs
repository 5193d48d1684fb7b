//! Transport-agnostic duplex endpoint and the listener registries used for
//! socket and connection events.
//!
//! A [`Socket`] hides whether it is backed by TCP or WebSocket.  Consumers
//! write with [`Socket::send_data`] and subscribe to incoming data with
//! [`Socket::on_data_received`], which returns a [`ListenerId`] that can later
//! be passed to [`Socket::remove_listener`].

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use relay_core::Packet;

use crate::domain::error::TransportError;
use crate::domain::payload::Payload;

/// Handle returned when registering a listener.
pub type ListenerId = u64;

/// Callback invoked for every payload a socket receives.
///
/// The socket awaits the returned future before delivering the next payload,
/// which is what gives each connection its FIFO ordering.
pub type DataListener = Arc<dyn Fn(Payload) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure as a [`DataListener`].
pub fn data_listener<F, Fut>(f: F) -> DataListener
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)))
}

/// How a connection turns frames into payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameMode {
    /// Frames are delivered as [`Payload::Bytes`]; `Bytes` and `Text` can be sent.
    #[default]
    Raw,
    /// Frames are decoded into [`Payload::Packet`]; packets (or JSON/text in
    /// packet shape) can be sent.
    Packet,
}

impl fmt::Display for FrameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameMode::Raw => f.write_str("raw"),
            FrameMode::Packet => f.write_str("packet"),
        }
    }
}

/// A duplex endpoint owned by a connection manager or a transport layer.
#[async_trait]
pub trait Socket: Send + Sync {
    /// Unique id allocated when the connection was created.
    fn id(&self) -> &str;

    fn peer_addr(&self) -> Option<SocketAddr>;

    fn is_closed(&self) -> bool;

    /// Queues `data` for writing.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] once the socket has closed; callers fanning
    /// out to many sockets should log and skip these.
    async fn send_data(&self, data: Payload) -> Result<(), TransportError>;

    fn on_data_received(&self, listener: DataListener) -> ListenerId;

    fn remove_listener(&self, id: ListenerId) -> bool;

    fn remove_all_listeners(&self);

    /// Resolves with the next packet of type `packet_type`.
    ///
    /// The waiter is registered before this method returns, so a packet that
    /// arrives between the call and the first poll is not missed.  There is no
    /// built-in timeout; wrap the future in `tokio::time::timeout` if needed.
    fn wait_for_packet(
        &self,
        packet_type: &str,
    ) -> BoxFuture<'static, Result<Packet, TransportError>>;

    /// Closes the socket and drops every listener.
    async fn close(&self);
}

// ── Listener registry ─────────────────────────────────────────────────────────

/// Ordered registry of callbacks keyed by [`ListenerId`].
///
/// Callbacks are cloned out under the lock and invoked after it is released,
/// so a callback may register or remove listeners without deadlocking.
pub struct Listeners<L> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, L)>>,
}

impl<L: Clone> Listeners<L> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: L) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, listener));
        id
    }

    /// Returns `true` if a listener with this id was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// The registered listeners, in registration order.
    pub fn snapshot(&self) -> Vec<L> {
        self.entries.lock().iter().map(|(_, l)| l.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<L: Clone> Default for Listeners<L> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_ids_are_unique_and_removable() {
        // Arrange
        let registry: Listeners<&'static str> = Listeners::new();
        let a = registry.add("a");
        let b = registry.add("b");

        // Act
        let removed = registry.remove(a);

        // Assert
        assert_ne!(a, b);
        assert!(removed);
        assert!(!registry.remove(a), "second removal must report nothing removed");
        assert_eq!(registry.snapshot(), vec!["b"]);
    }

    #[test]
    fn test_snapshot_preserves_registration_order() {
        let registry = Listeners::new();
        for n in 0..5 {
            registry.add(n);
        }
        assert_eq!(registry.snapshot(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_clear_empties_registry() {
        let registry = Listeners::new();
        registry.add(1);
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_data_listener_wraps_async_closure() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let listener = data_listener(move |payload| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(payload);
            }
        });

        listener(Payload::from("hi")).await;

        assert_eq!(rx.recv().await, Some(Payload::Text("hi".into())));
    }
}
