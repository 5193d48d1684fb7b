//! Application layer: the Bridge, the Layer contract, error handlers and the
//! transport-independent layers built on them.

pub mod bridge;
pub mod error_handler;
pub mod layer;
pub mod layers;

pub use bridge::{Bridge, WeakBridge};
pub use error_handler::{ErrorDisposition, ErrorHandler, LoggingErrorHandler, MultiErrorHandler};
pub use layer::{Layer, StartGuard};
