//! Error types for the event system.

use thiserror::Error;

/// Errors raised while registering, publishing or handling events.
///
/// Handlers return this type to report a failure to the dispatcher; the
/// dispatcher logs it with the handler and event identity and moves on.
#[derive(Debug, Error)]
pub enum EventError {
    /// The event key is not present in the catalog
    #[error("Unknown event key: {0}")]
    UnknownEvent(String),
    /// A handler failed while processing an event
    #[error("Handler execution error: {0}")]
    HandlerExecution(String),
    /// Event payload could not be read or written
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
    /// The dispatcher was started twice or after it stopped
    #[error("Dispatcher error: {0}")]
    Dispatcher(String),
    #[error("An unexpected error occurred: {0}")]
    Other(String),
}
