//! The dispatcher loop.

use super::core::{DispatcherState, EventBus};
use super::stats::StatsCounters;
use crate::error::EventError;
use crate::events::Event;
use crate::handler::{Dispatch, EventHandler};
use crate::utils::millis;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, trace, warn};

/// Outcome of one guarded handler call.
enum Invocation {
    Completed(Dispatch),
    Failed(String),
}

impl EventBus {
    /// Runs the dispatcher until the stop sentinel is observed.
    ///
    /// Pops entries in FIFO order. Expired entries are dropped without
    /// dispatch. On stop, every registered handler receives the exit event
    /// once before this returns.
    ///
    /// # Returns
    ///
    /// An error only if the dispatcher was already started.
    pub async fn run(self: Arc<Self>) -> Result<(), EventError> {
        let mut receiver = self.take_receiver()?;
        self.set_state(DispatcherState::Running);
        info!("🚦 Event dispatcher running");

        loop {
            let entry = tokio::select! {
                biased;
                _ = self.stop_signal.notified() => {
                    info!("🛑 Dispatcher woken by stop signal");
                    break;
                }
                entry = receiver.recv() => match entry {
                    Some(entry) => entry,
                    None => break,
                },
            };

            if entry.event.type_id() == self.stop_id {
                info!("🛑 Stop event received, leaving dispatch loop");
                break;
            }

            let now = Instant::now();
            if entry.is_expired(now) {
                StatsCounters::bump(&self.stats.dropped_expired);
                error!(
                    "⌛ Dropping expired event {} (waited {} in queue)",
                    self.catalog.display_key(entry.event.type_id()),
                    millis(now.duration_since(entry.enqueued_at))
                );
                continue;
            }

            self.dispatch(&entry.event).await;
        }

        self.set_state(DispatcherState::Draining);
        receiver.close();
        let abandoned = std::iter::from_fn(|| receiver.try_recv().ok()).count();
        if abandoned > 0 {
            warn!("⚠️ {} queued event(s) abandoned at shutdown", abandoned);
        }
        self.broadcast_exit().await;

        self.set_state(DispatcherState::Stopped);
        info!("✅ Event dispatcher stopped");
        Ok(())
    }

    /// Delivers one event to its handlers in registration order.
    pub(super) async fn dispatch(&self, event: &Event) {
        let handlers = self.registry.handlers_for(event.type_id());
        if handlers.is_empty() {
            trace!("No handlers for {}", self.catalog.display_key(event.type_id()));
            return;
        }
        StatsCounters::bump(&self.stats.dispatched);

        for handler in handlers {
            if !handler.is_enabled() {
                continue;
            }

            match self.invoke(&handler, event).await {
                Invocation::Completed(Dispatch::Continue) => {}
                Invocation::Completed(Dispatch::Veto) => {
                    StatsCounters::bump(&self.stats.vetoes);
                    info!(
                        "🚫 {} vetoed {}, skipping remaining handlers",
                        handler.handler_name(),
                        self.catalog.display_key(event.type_id())
                    );
                    break;
                }
                Invocation::Failed(reason) => {
                    StatsCounters::bump(&self.stats.handler_failures);
                    error!(
                        "❌ Handler {} failed on {}: {}",
                        handler.handler_name(),
                        self.catalog.display_key(event.type_id()),
                        reason
                    );
                }
            }
        }
    }

    /// Sends the exit event to every distinct handler, ignoring vetoes and
    /// enabled flags.
    async fn broadcast_exit(&self) {
        let exit = Event::signal(self.exit_id);
        let handlers = self.registry.all_handlers();
        info!("📣 Broadcasting exit to {} handler(s)", handlers.len());

        for handler in handlers {
            if let Invocation::Failed(reason) = self.invoke(&handler, &exit).await {
                StatsCounters::bump(&self.stats.handler_failures);
                error!(
                    "❌ Handler {} failed during shutdown: {}",
                    handler.handler_name(),
                    reason
                );
            }
        }
    }

    /// Calls a handler, converting errors and panics into `Invocation::Failed`
    /// and timing the call.
    async fn invoke(&self, handler: &Arc<dyn EventHandler>, event: &Event) -> Invocation {
        let started = Instant::now();
        let outcome = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
        let elapsed = started.elapsed();

        if elapsed > self.config.slow_handler_threshold {
            StatsCounters::bump(&self.stats.slow_handlers);
            warn!(
                "🐢 Handler {} took {} on {}",
                handler.handler_name(),
                millis(elapsed),
                self.catalog.display_key(event.type_id())
            );
        } else {
            trace!("{} handled in {}", handler.handler_name(), millis(elapsed));
        }

        match outcome {
            Ok(Ok(dispatch)) => Invocation::Completed(dispatch),
            Ok(Err(e)) => Invocation::Failed(e.to_string()),
            Err(panic) => Invocation::Failed(format!("panicked: {}", panic_message(&panic))),
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
