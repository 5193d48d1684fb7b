//! A live TCP or WebSocket connection exposed as a [`Socket`].
//!
//! Each connection runs up to three Tokio tasks:
//!
//! 1. **Reader** – reads frames from the transport (newline-delimited on TCP,
//!    one message per frame on WebSocket) into a bounded queue.
//! 2. **Writer** – drains an unbounded queue of outgoing frames so callers of
//!    [`Socket::send_data`] never wait on the network.
//! 3. **Delivery** – started by [`Connection::activate`]; takes frames off the
//!    queue in order, resolves `wait_for_packet` waiters and awaits every data
//!    listener before taking the next frame.  This gives each connection a
//!    strict FIFO through the whole pipeline.
//!
//! Frames read before `activate` is called stay queued, so a connection
//! manager can finish its `Established` callbacks (e.g. register listeners,
//! send a handshake) before the first byte is delivered.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use relay_core::{decode_packet, encode_packet, LineFramer, Packet};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    DataListener, FrameMode, ListenerId, Listeners, Payload, Socket, TransportError,
};

/// Frames read but not yet delivered, per connection.
const INCOMING_QUEUE: usize = 128;

const READ_CHUNK: usize = 8 * 1024;

/// Wire framing of the underlying transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    WebSocket,
}

enum Outgoing {
    Frame(Vec<u8>),
    Close,
}

type Waiter = (String, oneshot::Sender<Packet>);

pub struct Connection {
    id: String,
    peer_addr: Option<SocketAddr>,
    kind: TransportKind,
    mode: FrameMode,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    incoming: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    listeners: Listeners<DataListener>,
    waiters: Mutex<Vec<Waiter>>,
    closed: watch::Sender<bool>,
    /// Reader and delivery tasks.  The writer is detached: it ends once it has
    /// flushed the queue and seen `Close`, or when the queue's sender drops.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    // ── Construction ──────────────────────────────────────────────────────────

    /// Dials `addr` (`host:port`) over TCP.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectFailed`] if the connection is refused or the
    /// host cannot be resolved.
    pub async fn connect_tcp(addr: &str, mode: FrameMode) -> Result<Arc<Self>, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::ConnectFailed {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self::from_tcp_stream(stream, mode))
    }

    /// Opens a WebSocket client connection to `url` (`ws://host:port/path`).
    ///
    /// # Errors
    ///
    /// [`TransportError::WebSocket`] if the TCP connect or the HTTP upgrade fails.
    pub async fn connect_websocket(
        url: &str,
        mode: FrameMode,
    ) -> Result<Arc<Self>, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
        let peer_addr = match ws.get_ref() {
            MaybeTlsStream::Plain(stream) => stream.peer_addr().ok(),
            #[allow(unreachable_patterns)]
            _ => None,
        };
        Ok(Self::from_websocket(ws, peer_addr, mode))
    }

    /// Wraps an accepted or dialed TCP stream.
    pub fn from_tcp_stream(stream: TcpStream, mode: FrameMode) -> Arc<Self> {
        let peer_addr = stream.peer_addr().ok();
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {e}");
        }
        let (read_half, write_half) = stream.into_split();

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(INCOMING_QUEUE);
        let conn = Self::assemble(peer_addr, TransportKind::Tcp, mode, out_tx, in_rx);

        let reader = tokio::spawn(read_line_frames(read_half, in_tx, conn.id.clone()));
        tokio::spawn(write_line_frames(write_half, out_rx, conn.id.clone()));
        conn.tasks.lock().push(reader);
        conn
    }

    /// Wraps a WebSocket stream (client or server side) that has completed its
    /// handshake.
    pub fn from_websocket<S>(
        ws: WebSocketStream<S>,
        peer_addr: Option<SocketAddr>,
        mode: FrameMode,
    ) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(INCOMING_QUEUE);
        let conn = Self::assemble(peer_addr, TransportKind::WebSocket, mode, out_tx, in_rx);

        let reader = tokio::spawn(read_ws_frames(stream, in_tx, conn.id.clone()));
        tokio::spawn(write_ws_frames(sink, out_rx, conn.id.clone()));
        conn.tasks.lock().push(reader);
        conn
    }

    fn assemble(
        peer_addr: Option<SocketAddr>,
        kind: TransportKind,
        mode: FrameMode,
        outgoing: mpsc::UnboundedSender<Outgoing>,
        incoming: mpsc::Receiver<Vec<u8>>,
    ) -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            peer_addr,
            kind,
            mode,
            outgoing,
            incoming: Mutex::new(Some(incoming)),
            listeners: Listeners::new(),
            waiters: Mutex::new(Vec::new()),
            closed,
            tasks: Mutex::new(Vec::new()),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Starts delivering queued and future frames to listeners.  Calling it a
    /// second time has no effect.
    pub fn activate(self: &Arc<Self>) {
        let Some(incoming) = self.incoming.lock().take() else {
            return;
        };
        let conn = Arc::clone(self);
        let handle = tokio::spawn(async move { conn.deliver(incoming).await });
        self.tasks.lock().push(handle);
    }

    /// Resolves once the connection has closed, for whatever reason.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // An Err means the sender is gone, which only happens with `self`.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    /// Marks the connection closed, stops the reader and delivery tasks and
    /// lets the writer flush what is already queued.
    fn shutdown(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        info!(connection = %self.id, peer = ?self.peer_addr, "connection closed");
        let _ = self.outgoing.send(Outgoing::Close);
        let mut tasks = self.tasks.lock();
        for task in tasks.drain(..).filter(|t| !t.is_finished()) {
            task.abort();
        }
        drop(tasks);
        self.waiters.lock().clear();
        self.listeners.clear();
    }

    // ── Delivery ──────────────────────────────────────────────────────────────

    async fn deliver(self: Arc<Self>, mut incoming: mpsc::Receiver<Vec<u8>>) {
        while let Some(frame) = incoming.recv().await {
            let payload = match self.mode {
                FrameMode::Raw => {
                    if self.has_waiters() {
                        if let Ok(packet) = decode_packet(&frame) {
                            self.resolve_waiters(&packet);
                        }
                    }
                    Payload::Bytes(frame)
                }
                FrameMode::Packet => match decode_packet(&frame) {
                    Ok(packet) => {
                        self.resolve_waiters(&packet);
                        Payload::Packet(packet)
                    }
                    Err(e) => {
                        warn!(connection = %self.id, "dropping undecodable frame: {e}");
                        continue;
                    }
                },
            };

            for listener in self.listeners.snapshot() {
                listener(payload.clone()).await;
            }
        }
        debug!(connection = %self.id, "reader finished");
        self.shutdown();
    }

    fn has_waiters(&self) -> bool {
        !self.waiters.lock().is_empty()
    }

    fn resolve_waiters(&self, packet: &Packet) {
        let matched: Vec<Waiter> = {
            let mut waiters = self.waiters.lock();
            let (matched, rest) = waiters
                .drain(..)
                .partition(|(packet_type, _)| packet_type == packet.packet_type());
            *waiters = rest;
            matched
        };
        for (_, tx) in matched {
            let _ = tx.send(packet.clone());
        }
    }

    // ── Encoding ──────────────────────────────────────────────────────────────

    fn encode_outgoing(&self, data: Payload) -> Result<Vec<u8>, TransportError> {
        let frame = match (self.mode, data) {
            (FrameMode::Raw, Payload::Bytes(bytes)) => bytes,
            (FrameMode::Raw, Payload::Text(text)) => text.into_bytes(),
            (FrameMode::Packet, Payload::Packet(packet)) => encode_packet(&packet)?,
            (FrameMode::Packet, Payload::Json(value)) => {
                let packet: Packet =
                    serde_json::from_value(value).map_err(relay_core::CodecError::from)?;
                encode_packet(&packet)?
            }
            (FrameMode::Packet, Payload::Text(text)) => {
                decode_packet(text.as_bytes())?;
                text.into_bytes()
            }
            (FrameMode::Packet, Payload::Bytes(bytes)) => {
                decode_packet(&bytes)?;
                bytes
            }
            (mode, other) => {
                return Err(TransportError::UnsupportedPayload {
                    mode,
                    found: other.kind(),
                })
            }
        };
        if self.kind == TransportKind::Tcp && frame.contains(&b'\n') {
            return Err(TransportError::EmbeddedNewline);
        }
        Ok(frame)
    }
}

#[async_trait]
impl Socket for Connection {
    fn id(&self) -> &str {
        &self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn send_data(&self, data: Payload) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let frame = self.encode_outgoing(data)?;
        self.outgoing
            .send(Outgoing::Frame(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn on_data_received(&self, listener: DataListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn remove_all_listeners(&self) {
        self.listeners.clear();
    }

    fn wait_for_packet(
        &self,
        packet_type: &str,
    ) -> BoxFuture<'static, Result<Packet, TransportError>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.waiters.lock();
            // Checked under the lock: shutdown sets the flag before clearing.
            if self.is_closed() {
                return Box::pin(async { Err(TransportError::Closed) });
            }
            waiters.push((packet_type.to_string(), tx));
        }
        Box::pin(async move { rx.await.map_err(|_| TransportError::Closed) })
    }

    async fn close(&self) {
        self.shutdown();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

// ── TCP tasks ─────────────────────────────────────────────────────────────────

async fn read_line_frames(mut reader: OwnedReadHalf, frames: mpsc::Sender<Vec<u8>>, id: String) {
    let mut framer = LineFramer::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                if framer.buffered_len() > 0 {
                    debug!(
                        connection = %id,
                        "discarding {} bytes of unterminated frame",
                        framer.buffered_len()
                    );
                }
                return;
            }
            Ok(n) => n,
            Err(e) => {
                debug!(connection = %id, "read error: {e}");
                return;
            }
        };
        framer.push(&chunk[..n]);
        loop {
            match framer.next_frame() {
                Ok(Some(frame)) => {
                    if frames.send(frame).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(connection = %id, "closing connection: {e}");
                    return;
                }
            }
        }
    }
}

async fn write_line_frames(
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    id: String,
) {
    while let Some(item) = outgoing.recv().await {
        let Outgoing::Frame(mut frame) = item else {
            break;
        };
        frame.push(b'\n');
        if let Err(e) = writer.write_all(&frame).await {
            debug!(connection = %id, "write error: {e}");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

// ── WebSocket tasks ───────────────────────────────────────────────────────────

async fn read_ws_frames<S>(mut stream: S, frames: mpsc::Sender<Vec<u8>>, id: String)
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        let frame = match message {
            Ok(WsMessage::Text(text)) => text.into_bytes(),
            Ok(WsMessage::Binary(bytes)) => bytes,
            Ok(WsMessage::Close(_)) => break,
            // Ping/pong are answered by tungstenite itself.
            Ok(_) => continue,
            Err(e) => {
                debug!(connection = %id, "WebSocket read error: {e}");
                break;
            }
        };
        if frames.send(frame).await.is_err() {
            break;
        }
    }
}

async fn write_ws_frames<S>(
    mut sink: S,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    id: String,
) where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    while let Some(item) = outgoing.recv().await {
        let Outgoing::Frame(frame) = item else {
            break;
        };
        let message = match String::from_utf8(frame) {
            Ok(text) => WsMessage::Text(text),
            Err(e) => WsMessage::Binary(e.into_bytes()),
        };
        if let Err(e) = sink.send(message).await {
            debug!(connection = %id, "WebSocket write error: {e}");
            return;
        }
    }
    let _ = sink.close().await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    use crate::domain::{data_listener, PayloadKind};

    /// Returns a connected (client, server) pair over loopback TCP.
    async fn tcp_pair(mode: FrameMode) -> (Arc<Connection>, Arc<Connection>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (client, accepted) =
            tokio::join!(Connection::connect_tcp(&addr, mode), listener.accept());
        let server = Connection::from_tcp_stream(accepted.unwrap().0, mode);
        (client.unwrap(), server)
    }

    fn collect(conn: &Arc<Connection>) -> mpsc::UnboundedReceiver<Payload> {
        let (tx, rx) = mpsc::unbounded_channel();
        conn.on_data_received(data_listener(move |payload| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(payload);
            }
        }));
        conn.activate();
        rx
    }

    #[tokio::test]
    async fn test_raw_frames_arrive_in_order() {
        // Arrange
        let (client, server) = tcp_pair(FrameMode::Raw).await;
        let mut received = collect(&server);

        // Act
        for n in 0..20 {
            client.send_data(Payload::from(format!("frame-{n}"))).await.unwrap();
        }

        // Assert
        for n in 0..20 {
            let payload = timeout(Duration::from_secs(2), received.recv()).await.unwrap();
            assert_eq!(payload, Some(Payload::Bytes(format!("frame-{n}").into_bytes())));
        }
    }

    #[tokio::test]
    async fn test_frames_before_activation_are_not_lost() {
        let (client, server) = tcp_pair(FrameMode::Raw).await;
        client.send_data(Payload::from("early")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut received = collect(&server);

        let payload = timeout(Duration::from_secs(2), received.recv()).await.unwrap();
        assert_eq!(payload, Some(Payload::Bytes(b"early".to_vec())));
    }

    #[tokio::test]
    async fn test_packet_mode_resolves_waiter() {
        // Arrange: the waiter is registered before anything is sent
        let (client, server) = tcp_pair(FrameMode::Packet).await;
        let waiter = server.wait_for_packet("HELLO");
        server.activate();

        // Act
        client
            .send_data(Payload::Packet(Packet::new("OTHER", json!(1))))
            .await
            .unwrap();
        client
            .send_data(Payload::Packet(Packet::new("HELLO", json!({"n": 2}))))
            .await
            .unwrap();

        // Assert
        let packet = timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
        assert_eq!(packet.packet_type(), "HELLO");
        assert_eq!(packet.data(), &json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_raw_socket_rejects_json_payload() {
        let (client, _server) = tcp_pair(FrameMode::Raw).await;
        let err = client.send_data(Payload::Json(json!(1))).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::UnsupportedPayload {
                found: PayloadKind::Json,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_tcp_rejects_embedded_newline() {
        let (client, _server) = tcp_pair(FrameMode::Raw).await;
        let err = client.send_data(Payload::from("a\nb")).await.unwrap_err();
        assert!(matches!(err, TransportError::EmbeddedNewline));
    }

    #[tokio::test]
    async fn test_peer_close_is_observed_and_fails_waiters() {
        // Arrange
        let (client, server) = tcp_pair(FrameMode::Packet).await;
        let waiter = server.wait_for_packet("NEVER");
        server.activate();

        // Act
        client.close().await;

        // Assert
        timeout(Duration::from_secs(2), server.closed()).await.unwrap();
        assert!(server.is_closed());
        assert!(matches!(waiter.await, Err(TransportError::Closed)));
        assert!(matches!(
            server.send_data(Payload::from("x")).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_close_flushes_queued_frames() {
        let (client, server) = tcp_pair(FrameMode::Raw).await;
        let mut received = collect(&server);

        client.send_data(Payload::from("last words")).await.unwrap();
        client.close().await;

        let payload = timeout(Duration::from_secs(2), received.recv()).await.unwrap();
        assert_eq!(payload, Some(Payload::Bytes(b"last words".to_vec())));
    }

    #[tokio::test]
    async fn test_wait_after_close_fails_immediately() {
        let (client, _server) = tcp_pair(FrameMode::Packet).await;
        client.close().await;
        assert!(matches!(
            client.wait_for_packet("X").await,
            Err(TransportError::Closed)
        ));
    }
}
