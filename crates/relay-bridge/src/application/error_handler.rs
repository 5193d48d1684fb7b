//! Error handlers consulted by the Bridge when a layer fails.
//!
//! A handler either claims the error ([`ErrorDisposition::Handled`]), in which
//! case the pipeline call resolves to [`Flow::Halt`](crate::Flow::Halt), or
//! declines it, in which case the error is returned to whoever called
//! `handle_inbound_packet` / `handle_outbound_packet`.

use std::sync::Arc;

use tracing::warn;

use crate::domain::BridgeError;

/// Outcome of offering an error to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    Handled,
    NotHandled,
}

/// Decides whether a pipeline error is recovered locally.
///
/// The failing layer is available through [`BridgeError::layer`].  Closures
/// of the form `Fn(&BridgeError) -> ErrorDisposition` are handlers too.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, err: &BridgeError) -> ErrorDisposition;
}

impl<F> ErrorHandler for F
where
    F: Fn(&BridgeError) -> ErrorDisposition + Send + Sync,
{
    fn handle(&self, err: &BridgeError) -> ErrorDisposition {
        self(err)
    }
}

/// Tries each handler in order and stops at the first that handles the error.
#[derive(Default, Clone)]
pub struct MultiErrorHandler {
    handlers: Vec<Arc<dyn ErrorHandler>>,
}

impl MultiErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn push(&mut self, handler: Arc<dyn ErrorHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl ErrorHandler for MultiErrorHandler {
    fn handle(&self, err: &BridgeError) -> ErrorDisposition {
        for handler in &self.handlers {
            if handler.handle(err) == ErrorDisposition::Handled {
                return ErrorDisposition::Handled;
            }
        }
        ErrorDisposition::NotHandled
    }
}

/// Logs every error and leaves it unhandled.
///
/// Put it first in a [`MultiErrorHandler`] so errors are recorded even when a
/// later handler recovers them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle(&self, err: &BridgeError) -> ErrorDisposition {
        warn!(layer = err.layer(), "pipeline error: {err}");
        ErrorDisposition::NotHandled
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_error() -> BridgeError {
        BridgeError::failure("test", "boom")
    }

    #[test]
    fn test_empty_multi_handler_does_not_handle() {
        assert_eq!(
            MultiErrorHandler::new().handle(&sample_error()),
            ErrorDisposition::NotHandled
        );
    }

    #[test]
    fn test_multi_handler_stops_at_first_handled() {
        // Arrange: logging (declines) → recovering (handles) → never reached
        let mut first = MockErrorHandler::new();
        first
            .expect_handle()
            .times(1)
            .return_const(ErrorDisposition::NotHandled);
        let mut second = MockErrorHandler::new();
        second
            .expect_handle()
            .times(1)
            .return_const(ErrorDisposition::Handled);
        let mut third = MockErrorHandler::new();
        third.expect_handle().never();

        let chain = MultiErrorHandler::new()
            .with_handler(first)
            .with_handler(second)
            .with_handler(third);

        // Act
        let disposition = chain.handle(&sample_error());

        // Assert
        assert_eq!(disposition, ErrorDisposition::Handled);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_closure_handler_sees_layer_name() {
        let handler = |err: &BridgeError| {
            if err.layer() == "test" {
                ErrorDisposition::Handled
            } else {
                ErrorDisposition::NotHandled
            }
        };
        assert_eq!(handler.handle(&sample_error()), ErrorDisposition::Handled);
        assert_eq!(
            handler.handle(&BridgeError::failure("other", "x")),
            ErrorDisposition::NotHandled
        );
    }

    #[test]
    fn test_logging_handler_never_handles() {
        assert_eq!(
            LoggingErrorHandler.handle(&sample_error()),
            ErrorDisposition::NotHandled
        );
    }
}
