//! # Warden Event System
//!
//! The real-time half of the supervisor: a process-wide [`EventCatalog`] that
//! hands out stable ids for event keys, the [`Event`] value type, and the
//! [`EventBus`] that queues events, expires stale ones and fans them out to
//! registered handlers in registration order.
//!
//! ## Dispatch model
//!
//! * Producers call [`EventBus::publish`], which waits a bounded amount of
//!   time for queue capacity and fails soft.
//! * A single dispatcher ([`EventBus::run`]) pops entries in FIFO order and
//!   hands each one to the handlers registered for its type.
//! * A handler returns [`Dispatch::Continue`] or [`Dispatch::Veto`]; a veto
//!   stops delivery to the remaining handlers for that event only.
//! * Handler failures and panics are logged and isolated.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden_event_system::{handler_fn, Dispatch, Event, EventBus, EventBusConfig, EventCatalog, keys};
//!
//! # async fn demo() {
//! let catalog = Arc::new(EventCatalog::standard());
//! let bus = Arc::new(EventBus::new(catalog.clone(), EventBusConfig::default()));
//!
//! let say = catalog.id(keys::EVT_CLIENT_SAY).unwrap();
//! bus.register_handler(say, handler_fn("echo", |event| {
//!     println!("{:?}", event.data());
//!     Ok(Dispatch::Continue)
//! }));
//!
//! let dispatcher = tokio::spawn(bus.clone().run());
//! bus.publish_default(Event::new(say, serde_json::json!({"text": "hi"}))).await;
//! bus.request_stop().await;
//! let _ = dispatcher.await;
//! # }
//! ```

pub mod catalog;
pub mod error;
pub mod events;
pub mod handler;
pub mod shutdown;
pub mod system;
pub mod timers;
pub mod utils;

pub use catalog::{keys, EventCatalog};
pub use error::EventError;
pub use events::{Event, EventId, IdentityRef};
pub use handler::{handler_fn, Dispatch, EventHandler, FnHandler};
pub use shutdown::ShutdownState;
pub use system::{DispatcherState, EventBus, EventBusConfig, EventBusStats};
pub use timers::{TaskHandle, TaskScheduler};
pub use utils::current_timestamp;
