//! Statistics tracking for the event bus.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of event bus counters for monitoring and shutdown reports.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EventBusStats {
    /// Events accepted into the queue
    pub published: u64,
    /// Publishes rejected because the queue stayed full
    pub queue_full: u64,
    /// Entries dropped because their TTL passed before dispatch
    pub dropped_expired: u64,
    /// Events handed to the dispatcher's handler loop
    pub dispatched: u64,
    /// Handler invocations that returned an error or panicked
    pub handler_failures: u64,
    /// Events whose propagation was stopped by a veto
    pub vetoes: u64,
    /// Handler invocations slower than the configured threshold
    pub slow_handlers: u64,
    /// Distinct registered handlers
    pub handlers: usize,
    /// Entries currently waiting in the queue
    pub queued: usize,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub published: AtomicU64,
    pub queue_full: AtomicU64,
    pub dropped_expired: AtomicU64,
    pub dispatched: AtomicU64,
    pub handler_failures: AtomicU64,
    pub vetoes: AtomicU64,
    pub slow_handlers: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, handlers: usize, queued: usize) -> EventBusStats {
        EventBusStats {
            published: self.published.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            dropped_expired: self.dropped_expired.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            vetoes: self.vetoes.load(Ordering::Relaxed),
            slow_handlers: self.slow_handlers.load(Ordering::Relaxed),
            handlers,
            queued,
        }
    }
}
