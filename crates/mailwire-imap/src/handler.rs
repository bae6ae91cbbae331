//! Unsolicited response dispatch.
//!
//! Untagged responses arriving before a command's tagged completion are
//! offered to registered handlers in arrival order. A handler may consume
//! a response (folder bookkeeping for EXISTS/EXPUNGE/FETCH flag updates)
//! or pass it on; unconsumed responses end up on the command outcome.

use crate::parser::UntaggedResponse;

/// A handler's verdict on one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The response was handled and is dropped from the outcome.
    Consumed,
    /// The response is offered to the next handler.
    Pass,
}

/// Receives unsolicited untagged responses.
pub trait UnsolicitedHandler: Send {
    /// Handles one untagged response.
    fn handle(&mut self, response: &UntaggedResponse) -> Dispatch;
}

/// Ordered handler registry, owned by a connection.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn UnsolicitedHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler. Handlers run in registration order.
    pub fn register(&mut self, handler: Box<dyn UnsolicitedHandler>) {
        self.handlers.push(handler);
    }

    /// Offers a response to each handler; returns true once consumed.
    pub fn dispatch(&mut self, response: &UntaggedResponse) -> bool {
        for handler in &mut self.handlers {
            if handler.handle(response) == Dispatch::Consumed {
                return true;
            }
        }
        false
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ExistsCounter {
        seen: u32,
    }

    impl UnsolicitedHandler for ExistsCounter {
        fn handle(&mut self, response: &UntaggedResponse) -> Dispatch {
            if let UntaggedResponse::Exists(n) = response {
                self.seen = *n;
                Dispatch::Consumed
            } else {
                Dispatch::Pass
            }
        }
    }

    #[test]
    fn test_dispatch_consumed() {
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(ExistsCounter { seen: 0 }));

        assert!(registry.dispatch(&UntaggedResponse::Exists(5)));
        assert!(!registry.dispatch(&UntaggedResponse::Recent(1)));
    }

    #[test]
    fn test_empty_registry_passes() {
        let mut registry = HandlerRegistry::new();
        assert!(!registry.dispatch(&UntaggedResponse::Exists(5)));
    }
}
