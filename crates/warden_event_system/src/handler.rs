//! Handler trait and the dispatch outcome type.

use crate::error::EventError;
use crate::events::Event;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// What the dispatcher should do after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Hand the event to the next registered handler.
    Continue,
    /// Stop delivering this event to the remaining handlers.
    Veto,
}

/// Trait implemented by everything that can receive events from the bus.
///
/// Handlers are shared as `Arc<dyn EventHandler>` and identified by pointer:
/// registering the same `Arc` twice for one event type is a no-op.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static + Debug {
    /// Handles one event.
    ///
    /// # Returns
    ///
    /// `Ok(Dispatch::Continue)` to let lower handlers see the event,
    /// `Ok(Dispatch::Veto)` to stop propagation, or `Err(EventError)` if
    /// handling failed. Errors never stop propagation.
    async fn handle(&self, event: &Event) -> Result<Dispatch, EventError>;

    /// Returns a human-readable name for this handler for logging.
    fn handler_name(&self) -> &str;

    /// Disabled handlers stay registered but are skipped by the dispatcher.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Returns true if both handles point at the same handler instance.
pub(crate) fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Adapter turning a synchronous closure into an [`EventHandler`].
pub struct FnHandler<F>
where
    F: Fn(&Event) -> Result<Dispatch, EventError> + Send + Sync + 'static,
{
    name: String,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Event) -> Result<Dispatch, EventError> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> Debug for FnHandler<F>
where
    F: Fn(&Event) -> Result<Dispatch, EventError> + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> Result<Dispatch, EventError> + Send + Sync + 'static,
{
    async fn handle(&self, event: &Event) -> Result<Dispatch, EventError> {
        (self.handler)(event)
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

/// Wraps a closure as a shareable handler.
pub fn handler_fn<F>(name: impl Into<String>, handler: F) -> Arc<dyn EventHandler>
where
    F: Fn(&Event) -> Result<Dispatch, EventError> + Send + Sync + 'static,
{
    Arc::new(FnHandler::new(name, handler))
}
