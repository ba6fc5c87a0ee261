//! Shared services handed to every plugin.

use crate::storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use warden_event_system::{Event, EventBus, TaskHandle, TaskScheduler};
use warden_rcon::RconClient;

/// Explicit context object passed to plugins instead of global state.
#[derive(Debug, Clone)]
pub struct PluginContext {
    bus: Arc<EventBus>,
    rcon: Arc<RconClient>,
    storage: Arc<dyn Storage>,
    timers: Arc<TaskScheduler>,
    game: String,
}

impl PluginContext {
    pub fn new(
        bus: Arc<EventBus>,
        rcon: Arc<RconClient>,
        storage: Arc<dyn Storage>,
        timers: Arc<TaskScheduler>,
        game: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            rcon,
            storage,
            timers,
            game: game.into(),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn rcon(&self) -> &Arc<RconClient> {
        &self.rcon
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn timers(&self) -> &Arc<TaskScheduler> {
        &self.timers
    }

    /// Name of the game whose log is being parsed.
    pub fn game(&self) -> &str {
        &self.game
    }

    /// Publishes an event with the bus's default TTL.
    pub async fn publish(&self, event: Event) -> bool {
        self.bus.publish_default(event).await
    }

    /// Sends an RCON command after `delay` without blocking the caller.
    pub fn rcon_later(&self, delay: Duration, command: String) -> TaskHandle {
        let rcon = self.rcon.clone();
        self.timers.schedule_after(delay, async move {
            rcon.send(&command).await;
        })
    }
}
