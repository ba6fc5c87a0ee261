//! The event bus: bounded queue, handler registry and dispatcher.
//!
//! * [`core`] - bus construction and the producer side (`publish`)
//! * [`registry`] - ordered, duplicate-free handler lists per event type
//! * [`dispatch`] - the dispatcher loop and shutdown drain
//! * [`stats`] - counters and the serializable snapshot

pub mod core;
pub mod dispatch;
pub mod registry;
pub mod stats;


pub use self::core::{DispatcherState, EventBus, EventBusConfig};
pub use self::stats::EventBusStats;
