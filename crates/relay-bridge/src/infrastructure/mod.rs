//! Infrastructure layer: sockets, connection managers and the transport
//! layers that connect a Bridge to the network.

pub mod connection;
pub mod manager;
pub mod transport;

pub use connection::{Connection, TransportKind};
pub use manager::{
    connection_listener, ClientConnectionManager, ClientTarget, ConnectionEvent,
    ConnectionListener, ConnectionManager, ServerConnectionManager,
};
pub use transport::{ClientTransportLayer, GenericSocketLayer, ServerTransportLayer};
