//! Reusable layers: converters, composition, party addressing and helpers.

pub mod choice;
pub mod converters;
pub mod helpers;
pub mod multi;
pub mod party;

pub use choice::{ChoiceLayer, Classifier};
pub use converters::{BufferStringLayer, JsonMode, JsonStringLayer};
pub use helpers::{EchoLayer, TapLayer};
pub use multi::MultiLayer;
pub use party::PartyLayer;
