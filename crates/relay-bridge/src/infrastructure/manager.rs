//! Connection managers: owners of a transport's live socket set.
//!
//! A manager accepts (server) or dials (client) connections, allocates their
//! identity and announces them through [`ConnectionEvent`]s.  Consumers such
//! as the generic socket layer or the Nexus subscribe with
//! [`ConnectionManager::on_connection_event`] and never touch the transport.
//!
//! For every connection the manager:
//!
//! 1. registers it in the id → socket map,
//! 2. awaits every `Established` listener,
//! 3. activates frame delivery,
//! 4. waits for the connection to close, removes it from the map and awaits
//!    every `Disconnected` listener.
//!
//! Step 2 completing before step 3 guarantees listeners attached during
//! `Established` see the first frame.
//!
//! A stopped manager admits nothing: connections that finish their
//! handshake after `stop` are closed without an `Established` event, and
//! handshakes still in progress are aborted.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};

use crate::domain::{
    FrameMode, ListenerId, Listeners, Socket, TcpClientConfig, TcpServerConfig, TransportError,
    WsClientConfig, WsServerConfig,
};
use crate::infrastructure::connection::Connection;

/// Pause after a failed `accept()` so a persistent error (e.g. out of file
/// descriptors) does not spin the accept loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle notification for one socket.
#[derive(Clone)]
pub enum ConnectionEvent {
    Established(Arc<dyn Socket>),
    Disconnected(Arc<dyn Socket>),
}

impl ConnectionEvent {
    pub fn socket(&self) -> &Arc<dyn Socket> {
        match self {
            ConnectionEvent::Established(s) | ConnectionEvent::Disconnected(s) => s,
        }
    }
}

/// Callback for connection events.  Awaited before the next step of the
/// connection's lifecycle.
pub type ConnectionListener = Arc<dyn Fn(ConnectionEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure as a [`ConnectionListener`].
pub fn connection_listener<F, Fut>(f: F) -> ConnectionListener
where
    F: Fn(ConnectionEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Owner of one transport's connections.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    fn name(&self) -> &str;

    /// Starts listening or dialing.  Calling it on a running manager is a no-op.
    async fn start(&self) -> Result<(), TransportError>;

    /// Stops accepting and closes every live socket.
    async fn stop(&self);

    fn on_connection_event(&self, listener: ConnectionListener) -> ListenerId;

    fn remove_listener(&self, id: ListenerId) -> bool;

    fn socket(&self, id: &str) -> Option<Arc<dyn Socket>>;

    fn sockets(&self) -> Vec<Arc<dyn Socket>>;

    /// Bound address for servers; `None` before `start` and for clients.
    fn local_addr(&self) -> Option<SocketAddr>;
}

// ── Shared bookkeeping ────────────────────────────────────────────────────────

struct ManagerCore {
    name: String,
    mode: FrameMode,
    listeners: Listeners<ConnectionListener>,
    sockets: Mutex<HashMap<String, Arc<Connection>>>,
    /// Whether new connections are admitted.  Flipped under the `sockets` lock.
    open: AtomicBool,
    /// WebSocket upgrades that have not produced a connection yet.
    handshakes: Mutex<JoinSet<()>>,
}

impl ManagerCore {
    fn new(name: String, mode: FrameMode) -> Arc<Self> {
        Arc::new(Self {
            name,
            mode,
            listeners: Listeners::new(),
            sockets: Mutex::new(HashMap::new()),
            open: AtomicBool::new(false),
            handshakes: Mutex::new(JoinSet::new()),
        })
    }

    fn open(&self) {
        let _sockets = self.sockets.lock();
        self.open.store(true, Ordering::Release);
    }

    async fn emit(&self, event: ConnectionEvent) {
        for listener in self.listeners.snapshot() {
            listener(event.clone()).await;
        }
    }

    /// Steps 1–3: register, announce, activate.  Returns `false` (and closes
    /// `conn`) when the manager has been stopped in the meantime.
    async fn establish(&self, conn: &Arc<Connection>) -> bool {
        let admitted = {
            let mut sockets = self.sockets.lock();
            let open = self.open.load(Ordering::Acquire);
            if open {
                sockets.insert(conn.id().to_string(), Arc::clone(conn));
            }
            open
        };
        if !admitted {
            debug!(
                manager = %self.name,
                connection = conn.id(),
                "manager stopped; dropping connection"
            );
            conn.close().await;
            return false;
        }
        debug!(manager = %self.name, connection = conn.id(), "connection established");
        let socket: Arc<dyn Socket> = conn.clone();
        self.emit(ConnectionEvent::Established(socket)).await;
        conn.activate();
        true
    }

    /// Step 4: wait for close, unregister, announce.
    async fn watch(&self, conn: Arc<Connection>) {
        conn.closed().await;
        self.sockets.lock().remove(conn.id());
        debug!(manager = %self.name, connection = conn.id(), "connection disconnected");
        self.emit(ConnectionEvent::Disconnected(conn)).await;
    }

    fn socket(&self, id: &str) -> Option<Arc<dyn Socket>> {
        self.sockets
            .lock()
            .get(id)
            .map(|conn| Arc::clone(conn) as Arc<dyn Socket>)
    }

    fn sockets(&self) -> Vec<Arc<dyn Socket>> {
        self.sockets
            .lock()
            .values()
            .map(|conn| Arc::clone(conn) as Arc<dyn Socket>)
            .collect()
    }

    /// Stops admitting connections, aborts pending handshakes and closes every
    /// live socket.  Their `Disconnected` events still fire.
    async fn shut(&self) {
        let live: Vec<Arc<Connection>> = {
            let sockets = self.sockets.lock();
            self.open.store(false, Ordering::Release);
            sockets.values().cloned().collect()
        };
        self.handshakes.lock().abort_all();
        for conn in live {
            conn.close().await;
        }
    }
}

/// Runs the whole lifecycle of `conn` on its own task.
fn spawn_session(core: Arc<ManagerCore>, conn: Arc<Connection>) {
    tokio::spawn(async move {
        if core.establish(&conn).await {
            core.watch(conn).await;
        }
    });
}

// ── Server ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ServerProtocol {
    Tcp(TcpServerConfig),
    WebSocket(WsServerConfig),
}

impl ServerProtocol {
    fn address(&self) -> String {
        match self {
            ServerProtocol::Tcp(cfg) => cfg.address(),
            ServerProtocol::WebSocket(cfg) => cfg.address(),
        }
    }
}

/// Accepts TCP or WebSocket connections on a bound port.
pub struct ServerConnectionManager {
    protocol: ServerProtocol,
    core: Arc<ManagerCore>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl ServerConnectionManager {
    pub fn tcp(config: TcpServerConfig, mode: FrameMode) -> Self {
        Self::with_protocol(ServerProtocol::Tcp(config), "tcp-server", mode)
    }

    pub fn websocket(config: WsServerConfig, mode: FrameMode) -> Self {
        Self::with_protocol(ServerProtocol::WebSocket(config), "ws-server", mode)
    }

    fn with_protocol(protocol: ServerProtocol, name: &str, mode: FrameMode) -> Self {
        Self {
            protocol,
            core: ManagerCore::new(name.to_string(), mode),
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.accept_task.lock().is_some()
    }
}

#[async_trait]
impl ConnectionManager for ServerConnectionManager {
    fn name(&self) -> &str {
        &self.core.name
    }

    async fn start(&self) -> Result<(), TransportError> {
        if self.is_running() {
            return Ok(());
        }
        let addr = self.protocol.address();
        let listener = TcpListener::bind(addr.as_str())
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: addr.clone(),
                source,
            })?;
        let local = listener.local_addr()?;
        info!("{} listening on {local}", self.core.name);

        self.core.open();
        let core = Arc::clone(&self.core);
        let handle = match self.protocol {
            ServerProtocol::Tcp(_) => tokio::spawn(accept_tcp(listener, core)),
            ServerProtocol::WebSocket(_) => tokio::spawn(accept_websocket(listener, core)),
        };

        let mut slot = self.accept_task.lock();
        if slot.is_some() {
            // Lost a race with a concurrent start; keep the first listener.
            handle.abort();
            return Ok(());
        }
        *slot = Some(handle);
        *self.local_addr.lock() = Some(local);
        Ok(())
    }

    async fn stop(&self) {
        let Some(handle) = self.accept_task.lock().take() else {
            return;
        };
        handle.abort();
        *self.local_addr.lock() = None;
        self.core.shut().await;
        info!("{} stopped", self.core.name);
    }

    fn on_connection_event(&self, listener: ConnectionListener) -> ListenerId {
        self.core.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.core.listeners.remove(id)
    }

    fn socket(&self, id: &str) -> Option<Arc<dyn Socket>> {
        self.core.socket(id)
    }

    fn sockets(&self) -> Vec<Arc<dyn Socket>> {
        self.core.sockets()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

async fn accept_tcp(listener: TcpListener, core: Arc<ManagerCore>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                info!("{}: new connection from {peer_addr}", core.name);
                let conn = Connection::from_tcp_stream(stream, core.mode);
                spawn_session(Arc::clone(&core), conn);
            }
            Err(e) => {
                error!("{}: accept error: {e}", core.name);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn accept_websocket(listener: TcpListener, core: Arc<ManagerCore>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                // The upgrade runs on its own task so a slow handshake never
                // holds up the accept loop.
                let session_core = Arc::clone(&core);
                let mut handshakes = core.handshakes.lock();
                while handshakes.try_join_next().is_some() {}
                handshakes.spawn(async move {
                    match upgrade(stream, peer_addr, session_core.mode).await {
                        Ok(conn) => {
                            info!(
                                "{}: WebSocket session established: {peer_addr}",
                                session_core.name
                            );
                            spawn_session(session_core, conn);
                        }
                        Err(e) => {
                            warn!("{}: handshake with {peer_addr} failed: {e}", session_core.name);
                        }
                    }
                });
            }
            Err(e) => {
                error!("{}: accept error: {e}", core.name);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn upgrade(
    stream: TcpStream,
    peer_addr: SocketAddr,
    mode: FrameMode,
) -> Result<Arc<Connection>, TransportError> {
    let ws = accept_async(stream).await?;
    Ok(Connection::from_websocket(ws, Some(peer_addr), mode))
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Where a client transport dials.
#[derive(Debug, Clone)]
pub enum ClientTarget {
    Tcp(TcpClientConfig),
    WebSocket(WsClientConfig),
}

impl ClientTarget {
    pub async fn connect(&self, mode: FrameMode) -> Result<Arc<Connection>, TransportError> {
        match self {
            ClientTarget::Tcp(cfg) => Connection::connect_tcp(&cfg.address(), mode).await,
            ClientTarget::WebSocket(cfg) => Connection::connect_websocket(&cfg.url, mode).await,
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        match self {
            ClientTarget::Tcp(cfg) => cfg.reconnect_interval(),
            ClientTarget::WebSocket(cfg) => cfg.reconnect_interval(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ClientTarget::Tcp(cfg) => format!("tcp://{}", cfg.address()),
            ClientTarget::WebSocket(cfg) => cfg.url.clone(),
        }
    }
}

/// Dials a single outgoing connection.
///
/// `start` connects once and returns after the `Established` listeners have
/// run; reconnecting is left to the caller (see
/// [`ClientTransportLayer`](crate::ClientTransportLayer) for a layer that
/// reconnects on its own).
pub struct ClientConnectionManager {
    target: ClientTarget,
    core: Arc<ManagerCore>,
    current: Mutex<Option<Arc<Connection>>>,
}

impl ClientConnectionManager {
    pub fn tcp(config: TcpClientConfig, mode: FrameMode) -> Self {
        Self::with_target(ClientTarget::Tcp(config), "tcp-client", mode)
    }

    pub fn websocket(config: WsClientConfig, mode: FrameMode) -> Self {
        Self::with_target(ClientTarget::WebSocket(config), "ws-client", mode)
    }

    fn with_target(target: ClientTarget, name: &str, mode: FrameMode) -> Self {
        Self {
            target,
            core: ManagerCore::new(name.to_string(), mode),
            current: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ConnectionManager for ClientConnectionManager {
    fn name(&self) -> &str {
        &self.core.name
    }

    async fn start(&self) -> Result<(), TransportError> {
        let connected = self
            .current
            .lock()
            .as_ref()
            .is_some_and(|conn| !conn.is_closed());
        if connected {
            return Ok(());
        }

        self.core.open();
        let conn = self.target.connect(self.core.mode).await?;
        info!("{} connected to {}", self.core.name, self.target.describe());
        *self.current.lock() = Some(Arc::clone(&conn));

        if self.core.establish(&conn).await {
            let core = Arc::clone(&self.core);
            tokio::spawn(async move { core.watch(conn).await });
        }
        Ok(())
    }

    async fn stop(&self) {
        self.current.lock().take();
        self.core.shut().await;
    }

    fn on_connection_event(&self, listener: ConnectionListener) -> ListenerId {
        self.core.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.core.listeners.remove(id)
    }

    fn socket(&self, id: &str) -> Option<Arc<dyn Socket>> {
        self.core.socket(id)
    }

    fn sockets(&self) -> Vec<Arc<dyn Socket>> {
        self.core.sockets()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
