//! Nexus logic: the broker state machine and the layer that hosts it.

pub mod broker;
pub mod nexus_layer;

pub use broker::{Broker, Delivery};
pub use nexus_layer::NexusLayer;
