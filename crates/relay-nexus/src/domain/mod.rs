//! Pure Nexus types: channels, configuration and errors.

pub mod channel;
pub mod config;
pub mod error;

pub use channel::{Channel, ClientId};
pub use config::{ConfigError, ListenerSection, NexusConfig};
pub use error::NexusError;
