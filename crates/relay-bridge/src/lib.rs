//! # relay-bridge
//!
//! A composable, bidirectional packet pipeline.
//!
//! A [`Bridge`] owns two chains of [`Layer`]s.  Data received from a transport
//! enters the *inbound* chain; data an application wants to send enters the
//! *outbound* chain.  Each layer transforms the payload and passes it on, or
//! halts it.
//!
//! ```text
//!   socket ──► inbound chain ──► application
//!   application ──► outbound chain ──► socket(s)
//! ```
//!
//! # Modules
//!
//! - **`domain`** – Payloads, pipeline metadata, the [`Socket`] trait, errors
//!   and transport configuration.
//! - **`application`** – The [`Bridge`], the [`Layer`] contract, error
//!   handlers and transport-independent layers (converters, [`MultiLayer`],
//!   [`ChoiceLayer`], [`PartyLayer`]).
//! - **`infrastructure`** – TCP and WebSocket connections, connection
//!   managers and the transport layers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use relay_bridge::{
//!     Bridge, BufferStringLayer, JsonStringLayer, MultiLayer, ServerTransportLayer,
//!     TapLayer, TcpServerConfig,
//! };
//!
//! # async fn run() -> Result<(), relay_bridge::BridgeError> {
//! let server = Arc::new(ServerTransportLayer::tcp(TcpServerConfig::default()));
//! let inbound = MultiLayer::new()
//!     .attach_layer(BufferStringLayer::default())
//!     .attach_layer(JsonStringLayer::new())
//!     .attach_layer(TapLayer::new(|payload, _| println!("{payload:?}")));
//! let bridge = Bridge::new(Arc::new(inbound), server);
//! bridge.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::layers::{
    BufferStringLayer, ChoiceLayer, Classifier, EchoLayer, JsonMode, JsonStringLayer, MultiLayer,
    PartyLayer, TapLayer,
};
pub use application::{
    Bridge, ErrorDisposition, ErrorHandler, Layer, LoggingErrorHandler, MultiErrorHandler,
    StartGuard, WeakBridge,
};
pub use domain::{
    data_listener, BridgeError, DataListener, Direction, Flow, FrameMode, ListenerId, PartyInfo,
    Payload, PayloadKind, PipelineMetadata, Socket, TcpClientConfig, TcpServerConfig,
    TextEncoding, TransportError, WsClientConfig, WsServerConfig,
};
pub use infrastructure::{
    connection_listener, ClientConnectionManager, ClientTarget, ClientTransportLayer,
    Connection, ConnectionEvent, ConnectionListener, ConnectionManager, GenericSocketLayer,
    ServerConnectionManager, ServerTransportLayer, TransportKind,
};

pub use relay_core::Packet;
