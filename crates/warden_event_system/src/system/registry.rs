//! Handler registry.
//!
//! Each event type maps to an ordered list of handlers; list order is dispatch
//! order. A second, global list remembers every distinct handler in the order
//! it was first registered, which is the order of the shutdown broadcast.

use crate::events::EventId;
use crate::handler::{same_handler, EventHandler};
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    by_type: DashMap<EventId, Vec<Arc<dyn EventHandler>>>,
    all: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    /// Appends `handler` to the list for `type_id`.
    ///
    /// Returns false if the same handler was already registered for that type.
    pub fn register(&self, type_id: EventId, handler: Arc<dyn EventHandler>) -> bool {
        {
            let mut handlers = self.by_type.entry(type_id).or_default();
            if handlers.iter().any(|existing| same_handler(existing, &handler)) {
                return false;
            }
            handlers.push(handler.clone());
        }

        let mut all = self.all.write().unwrap_or_else(PoisonError::into_inner);
        if !all.iter().any(|existing| same_handler(existing, &handler)) {
            all.push(handler);
        }
        true
    }

    /// Removes `handler` from every event type. Returns how many entries were removed.
    pub fn unregister(&self, handler: &Arc<dyn EventHandler>) -> usize {
        let mut removed = 0;
        for mut entry in self.by_type.iter_mut() {
            let before = entry.len();
            entry.retain(|existing| !same_handler(existing, handler));
            removed += before - entry.len();
        }
        self.by_type.retain(|_, handlers| !handlers.is_empty());

        self.all
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|existing| !same_handler(existing, handler));
        removed
    }

    /// Snapshot of the handlers for one event type, in dispatch order.
    pub fn handlers_for(&self, type_id: EventId) -> Vec<Arc<dyn EventHandler>> {
        self.by_type
            .get(&type_id)
            .map(|handlers| handlers.clone())
            .unwrap_or_default()
    }

    /// Snapshot of every distinct handler, in first-registration order.
    pub fn all_handlers(&self) -> Vec<Arc<dyn EventHandler>> {
        self.all.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn handler_count(&self) -> usize {
        self.all.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
