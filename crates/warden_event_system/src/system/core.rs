//! Core EventBus implementation: construction, configuration and publishing.

use super::registry::HandlerRegistry;
use super::stats::{EventBusStats, StatsCounters};
use crate::catalog::{keys, EventCatalog};
use crate::error::EventError;
use crate::events::{Event, EventId};
use crate::handler::EventHandler;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Tunables for the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Maximum number of queued events
    pub queue_capacity: usize,
    /// TTL applied by [`EventBus::publish_default`]
    pub default_ttl: Duration,
    /// How long a publish may wait for queue capacity; zero means a single attempt
    pub publish_timeout: Duration,
    /// Handler invocations slower than this are logged as warnings
    pub slow_handler_threshold: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            default_ttl: Duration::from_secs(15),
            publish_timeout: Duration::from_secs(2),
            slow_handler_threshold: Duration::from_secs(2),
        }
    }
}

/// Lifecycle of the dispatcher. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Constructed, `run` not called yet
    Idle,
    /// Consuming the queue
    Running,
    /// Stop observed; broadcasting the exit event
    Draining,
    /// `run` returned
    Stopped,
}

impl DispatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// One queued event together with its expiry deadline.
#[derive(Debug)]
pub(crate) struct QueueEntry {
    pub enqueued_at: Instant,
    /// `None` when the TTL reaches past what `Instant` can represent
    pub expires_at: Option<Instant>,
    pub event: Event,
}

impl QueueEntry {
    pub fn new(event: Event, ttl: Duration) -> Self {
        let enqueued_at = Instant::now();
        Self {
            enqueued_at,
            expires_at: enqueued_at.checked_add(ttl),
            event,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }
}

/// Bounded event queue with a single dispatcher.
///
/// The bus is shared as `Arc<EventBus>`: producers call [`publish`](Self::publish)
/// from any task or thread, and exactly one task runs [`run`](Self::run).
pub struct EventBus {
    pub(super) catalog: Arc<EventCatalog>,
    pub(super) config: EventBusConfig,
    pub(super) sender: mpsc::Sender<QueueEntry>,
    pub(super) receiver: Mutex<Option<mpsc::Receiver<QueueEntry>>>,
    pub(super) registry: HandlerRegistry,
    pub(super) stats: StatsCounters,
    pub(super) state: AtomicU8,
    pub(super) stop_signal: Notify,
    pub(super) stop_id: EventId,
    pub(super) exit_id: EventId,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("handlers", &self.registry.handler_count())
            .finish()
    }
}

impl EventBus {
    /// Creates a bus over `catalog`.
    ///
    /// The stop and exit lifecycle keys are registered in the catalog if the
    /// caller has not done so already.
    pub fn new(catalog: Arc<EventCatalog>, config: EventBusConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let stop_id = catalog.register(keys::EVT_STOP, "Stop Process");
        let exit_id = catalog.register(keys::EVT_EXIT, "Program Exit");

        Self {
            catalog,
            config,
            sender,
            receiver: Mutex::new(Some(receiver)),
            registry: HandlerRegistry::default(),
            stats: StatsCounters::default(),
            state: AtomicU8::new(DispatcherState::Idle as u8),
            stop_signal: Notify::new(),
            stop_id,
            exit_id,
        }
    }

    pub fn catalog(&self) -> &Arc<EventCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(super) fn set_state(&self, state: DispatcherState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Id of the reserved stop sentinel.
    pub fn stop_event_id(&self) -> EventId {
        self.stop_id
    }

    /// Id of the terminal lifecycle event broadcast while draining.
    pub fn exit_event_id(&self) -> EventId {
        self.exit_id
    }

    /// Current counters.
    pub fn stats(&self) -> EventBusStats {
        let queued = self.config.queue_capacity.max(1) - self.sender.capacity();
        self.stats.snapshot(self.registry.handler_count(), queued)
    }

    /// Registers `handler` for `type_id`, after any handler already registered for it.
    ///
    /// Registering the same handler twice for one type is a no-op.
    pub fn register_handler(&self, type_id: EventId, handler: Arc<dyn EventHandler>) {
        let name = handler.handler_name().to_string();
        if self.registry.register(type_id, handler) {
            debug!(
                "📝 Registered handler {} for {}",
                name,
                self.catalog.display_key(type_id)
            );
        }
    }

    /// Registers `handler` for an event key, adding the key to the catalog if needed.
    pub fn register_handler_for_key(&self, key: &str, handler: Arc<dyn EventHandler>) -> EventId {
        let type_id = self.catalog.register(key, key);
        self.register_handler(type_id, handler);
        type_id
    }

    /// Removes `handler` from every event type it was registered for.
    pub fn unregister_handler(&self, handler: &Arc<dyn EventHandler>) {
        let removed = self.registry.unregister(handler);
        debug!(
            "🗑️ Unregistered handler {} ({} registrations)",
            handler.handler_name(),
            removed
        );
    }

    /// Handlers registered for a type, in dispatch order.
    pub fn handlers_for(&self, type_id: EventId) -> Vec<Arc<dyn EventHandler>> {
        self.registry.handlers_for(type_id)
    }

    /// Looks up an event id by key.
    pub fn event_id(&self, key: &str) -> Result<EventId, EventError> {
        self.catalog
            .id(key)
            .ok_or_else(|| EventError::UnknownEvent(key.to_string()))
    }

    /// Publishes an event with the default TTL.
    pub async fn publish_default(&self, event: Event) -> bool {
        self.publish(event, self.config.default_ttl).await
    }

    /// Queues `event`, giving up after the configured publish timeout.
    ///
    /// # Returns
    ///
    /// `true` if the event was queued. A full queue or a stopped dispatcher
    /// logs an error and returns `false`; the event is dropped.
    pub async fn publish(&self, event: Event, ttl: Duration) -> bool {
        self.publish_with(event, ttl, self.config.publish_timeout).await
    }

    /// Like [`publish`](Self::publish) with an explicit wait bound.
    pub async fn publish_with(&self, event: Event, ttl: Duration, wait: Duration) -> bool {
        let type_id = event.type_id();
        let entry = QueueEntry::new(event, ttl);

        let queue_full = if wait.is_zero() {
            match self.sender.try_send(entry) {
                Ok(()) => None,
                Err(TrySendError::Full(_)) => Some(true),
                Err(TrySendError::Closed(_)) => Some(false),
            }
        } else {
            match self.sender.send_timeout(entry, wait).await {
                Ok(()) => None,
                Err(SendTimeoutError::Timeout(_)) => Some(true),
                Err(SendTimeoutError::Closed(_)) => Some(false),
            }
        };

        match queue_full {
            None => {
                StatsCounters::bump(&self.stats.published);
                true
            }
            Some(true) => {
                StatsCounters::bump(&self.stats.queue_full);
                error!(
                    "❌ Event queue full, dropping {}",
                    self.catalog.display_key(type_id)
                );
                false
            }
            Some(false) => {
                error!(
                    "❌ Dispatcher stopped, dropping {}",
                    self.catalog.display_key(type_id)
                );
                false
            }
        }
    }

    /// Asks the dispatcher to stop.
    ///
    /// Queues the stop sentinel behind any pending events. If the queue stays
    /// full, the dispatcher is woken directly and pending events are abandoned.
    pub async fn request_stop(&self) -> bool {
        let entry = QueueEntry::new(Event::signal(self.stop_id), self.config.default_ttl);

        match self
            .sender
            .send_timeout(entry, self.config.publish_timeout)
            .await
        {
            Ok(()) => true,
            Err(_) => {
                warn!("⚠️ Could not queue stop event, signalling dispatcher directly");
                self.stop_signal.notify_one();
                false
            }
        }
    }

    pub(super) fn take_receiver(&self) -> Result<mpsc::Receiver<QueueEntry>, EventError> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| EventError::Dispatcher("dispatcher already started".to_string()))
    }
}
