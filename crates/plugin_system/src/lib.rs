//! Plugin system for Warden.
//!
//! Plugins are compiled in and made available through a [`PluginRegistry`]
//! of factories. The [`PluginScheduler`] resolves the configured entries,
//! orders them by their declared dependencies and registers each loaded
//! plugin on the event bus. Every plugin receives the same
//! [`PluginContext`] (bus, RCON client, storage, timers).

mod context;
mod descriptor;
mod error;
mod graph;
mod plugin;
mod registry;
mod scheduler;
mod storage;
mod version;

pub use context::PluginContext;
pub use descriptor::{PluginConfig, PluginEntry, PluginRequirements};
pub use error::{PluginError, PluginSystemError};
pub use plugin::{Plugin, PluginInstance};
pub use registry::{PluginFactory, PluginRegistry};
pub use scheduler::{PluginScheduler, ADMIN_PLUGIN};
pub use storage::{open_storage, JsonFileStorage, MemoryStorage, Storage};
pub use version::{check_minimum, Version, WARDEN_VERSION};

/// Re-export commonly used types for plugin development
pub use warden_event_system::{keys, Dispatch, Event, IdentityRef};
