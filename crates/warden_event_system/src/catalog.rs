//! Registry of event keys.
//!
//! Event keys are opaque strings (`EVT_CLIENT_SAY`, `EVT_STOP`, ...). The
//! catalog assigns each distinct key a numeric [`EventId`] the first time it is
//! registered; later registrations of the same key return the same id and keep
//! the original description. Ids are never reused or reassigned.

use crate::events::EventId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Well-known event keys.
///
/// The `EVT_STARTUP` to `EVT_CLIENT_DISCONNECT` group is emitted by the core
/// itself; the rest are produced by the bundled game grammars.
pub mod keys {
    pub const EVT_STARTUP: &str = "EVT_STARTUP";
    pub const EVT_STOP: &str = "EVT_STOP";
    pub const EVT_EXIT: &str = "EVT_EXIT";
    pub const EVT_UNKNOWN: &str = "EVT_UNKNOWN";
    pub const EVT_CLIENT_CONNECT: &str = "EVT_CLIENT_CONNECT";
    pub const EVT_CLIENT_DISCONNECT: &str = "EVT_CLIENT_DISCONNECT";

    pub const EVT_CLIENT_JOIN: &str = "EVT_CLIENT_JOIN";
    pub const EVT_CLIENT_INFO_CHANGE: &str = "EVT_CLIENT_INFO_CHANGE";
    pub const EVT_CLIENT_SAY: &str = "EVT_CLIENT_SAY";
    pub const EVT_CLIENT_TEAM_SAY: &str = "EVT_CLIENT_TEAM_SAY";
    pub const EVT_CLIENT_PRIVATE_SAY: &str = "EVT_CLIENT_PRIVATE_SAY";
    pub const EVT_CLIENT_KILL: &str = "EVT_CLIENT_KILL";
    pub const EVT_CLIENT_SUICIDE: &str = "EVT_CLIENT_SUICIDE";
    pub const EVT_CLIENT_ITEM_PICKUP: &str = "EVT_CLIENT_ITEM_PICKUP";
    pub const EVT_CLIENT_SCORE: &str = "EVT_CLIENT_SCORE";
    pub const EVT_GAME_ROUND_START: &str = "EVT_GAME_ROUND_START";
    pub const EVT_GAME_ROUND_END: &str = "EVT_GAME_ROUND_END";
    pub const EVT_GAME_WARMUP: &str = "EVT_GAME_WARMUP";
    pub const EVT_GAME_EXIT: &str = "EVT_GAME_EXIT";
    pub const EVT_GAME_ACTION: &str = "EVT_GAME_ACTION";
}

const CORE_EVENTS: &[(&str, &str)] = &[
    (keys::EVT_STARTUP, "Program Startup"),
    (keys::EVT_STOP, "Stop Process"),
    (keys::EVT_EXIT, "Program Exit"),
    (keys::EVT_UNKNOWN, "Unknown Event"),
    (keys::EVT_CLIENT_CONNECT, "Client Connect"),
    (keys::EVT_CLIENT_DISCONNECT, "Client Disconnect"),
];

const GAME_EVENTS: &[(&str, &str)] = &[
    (keys::EVT_CLIENT_JOIN, "Client Join Game"),
    (keys::EVT_CLIENT_INFO_CHANGE, "Client Info Change"),
    (keys::EVT_CLIENT_SAY, "Say"),
    (keys::EVT_CLIENT_TEAM_SAY, "Team Say"),
    (keys::EVT_CLIENT_PRIVATE_SAY, "Private Message"),
    (keys::EVT_CLIENT_KILL, "Client Kill"),
    (keys::EVT_CLIENT_SUICIDE, "Client Suicide"),
    (keys::EVT_CLIENT_ITEM_PICKUP, "Item Pickup"),
    (keys::EVT_CLIENT_SCORE, "Client Score"),
    (keys::EVT_GAME_ROUND_START, "Start of Round"),
    (keys::EVT_GAME_ROUND_END, "End of Round"),
    (keys::EVT_GAME_WARMUP, "Game Warmup"),
    (keys::EVT_GAME_EXIT, "Game Exit"),
    (keys::EVT_GAME_ACTION, "Game Action"),
];

#[derive(Debug, Clone)]
struct CatalogEntry {
    key: String,
    description: String,
}

/// Maps event keys to stable ids and back.
///
/// Constructed once at startup and shared by `Arc` with the bus, the
/// translator and the plugin scheduler.
#[derive(Debug, Default)]
pub struct EventCatalog {
    by_key: DashMap<String, EventId>,
    by_id: DashMap<EventId, CatalogEntry>,
    next_id: AtomicU32,
}

impl EventCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding the lifecycle events the core emits.
    pub fn with_core_events() -> Self {
        let catalog = Self::new();
        for (key, description) in CORE_EVENTS {
            catalog.register(key, description);
        }
        catalog
    }

    /// Creates a catalog holding the core events plus the common game events.
    pub fn standard() -> Self {
        let catalog = Self::with_core_events();
        for (key, description) in GAME_EVENTS {
            catalog.register(key, description);
        }
        catalog
    }

    /// Registers an event key and returns its id.
    ///
    /// Registering a key that already exists returns the existing id; the
    /// first description wins.
    pub fn register(&self, key: &str, description: &str) -> EventId {
        match self.by_key.entry(key.to_string()) {
            Entry::Occupied(existing) => *existing.get(),
            Entry::Vacant(slot) => {
                let id = EventId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
                self.by_id.insert(
                    id,
                    CatalogEntry {
                        key: key.to_string(),
                        description: description.to_string(),
                    },
                );
                slot.insert(id);
                debug!("📇 Registered event {} as {}", key, id);
                id
            }
        }
    }

    /// Looks up the id of a registered key.
    pub fn id(&self, key: &str) -> Option<EventId> {
        self.by_key.get(key).map(|id| *id)
    }

    /// Looks up the key an id was assigned to.
    pub fn key(&self, id: EventId) -> Option<String> {
        self.by_id.get(&id).map(|entry| entry.key.clone())
    }

    /// Looks up the human-readable description of an id.
    pub fn description(&self, id: EventId) -> Option<String> {
        self.by_id.get(&id).map(|entry| entry.description.clone())
    }

    /// Returns the key for an id, or a placeholder for ids this catalog never issued.
    pub fn display_key(&self, id: EventId) -> String {
        self.key(id).unwrap_or_else(|| format!("<unregistered {}>", id))
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
