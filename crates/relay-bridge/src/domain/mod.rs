//! Domain types shared by every layer and transport: payloads, pipeline
//! metadata, the socket abstraction, errors and transport configuration.

pub mod config;
pub mod error;
pub mod metadata;
pub mod payload;
pub mod socket;

pub use config::{TcpClientConfig, TcpServerConfig, WsClientConfig, WsServerConfig};
pub use error::{BridgeError, TransportError};
pub use metadata::{Direction, PartyInfo, PipelineMetadata};
pub use payload::{Flow, Payload, PayloadKind, TextEncoding};
pub use socket::{data_listener, DataListener, FrameMode, ListenerId, Listeners, Socket};
