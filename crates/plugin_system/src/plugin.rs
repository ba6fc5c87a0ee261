//! The plugin contract and loaded plugin instances.

use crate::context::PluginContext;
use crate::descriptor::{PluginConfig, PluginEntry, PluginRequirements};
use crate::error::PluginError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use tokio::sync::RwLock;
use warden_event_system::{Dispatch, Event, EventError, EventHandler, EventId};

/// Trait every plugin implements.
///
/// # Lifecycle
///
/// 1. The factory creates the instance
/// 2. `on_load_config` receives the plugin's configuration (again on reload)
/// 3. Handlers are registered for each key in `subscriptions`
/// 4. `on_startup` runs once all plugins are loaded, in load order
/// 5. `on_event` runs for each subscribed event, and once for `EVT_EXIT`
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.0.0"
    }

    /// Event keys this plugin handles.
    fn subscriptions(&self) -> Vec<String>;

    /// Applies configuration. Called before startup and on every reload.
    fn on_load_config(&mut self, _config: &PluginConfig) -> Result<(), PluginError> {
        Ok(())
    }

    async fn on_startup(&self, _context: Arc<PluginContext>) -> Result<(), PluginError> {
        Ok(())
    }

    /// Handles one event.
    ///
    /// # Returns
    ///
    /// `Dispatch::Veto` to hide the event from plugins loaded after this one.
    async fn on_event(&self, event: &Event, context: &PluginContext) -> Result<Dispatch, PluginError>;
}

/// A loaded plugin, registered on the bus as an [`EventHandler`].
pub struct PluginInstance {
    name: String,
    entry: PluginEntry,
    requirements: PluginRequirements,
    plugin: RwLock<Box<dyn Plugin>>,
    config: StdRwLock<PluginConfig>,
    enabled: AtomicBool,
    subscriptions: StdRwLock<Vec<EventId>>,
    context: Arc<PluginContext>,
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.name)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl PluginInstance {
    pub(crate) fn new(
        entry: PluginEntry,
        requirements: PluginRequirements,
        plugin: Box<dyn Plugin>,
        config: PluginConfig,
        enabled: bool,
        context: Arc<PluginContext>,
    ) -> Self {
        Self {
            name: entry.name.clone(),
            entry,
            requirements,
            plugin: RwLock::new(plugin),
            config: StdRwLock::new(config),
            enabled: AtomicBool::new(enabled),
            subscriptions: StdRwLock::new(Vec::new()),
            context,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &PluginEntry {
        &self.entry
    }

    pub fn requirements(&self) -> &PluginRequirements {
        &self.requirements
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Event types this instance is registered for.
    pub fn subscriptions(&self) -> Vec<EventId> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_subscriptions(&self, ids: Vec<EventId>) {
        *self.subscriptions.write().unwrap_or_else(PoisonError::into_inner) = ids;
    }

    /// Path of the config file, if the entry named one.
    pub fn config_path(&self) -> Option<std::path::PathBuf> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .path()
            .map(|p| p.to_path_buf())
            .or_else(|| self.entry.config.clone())
    }

    pub async fn version(&self) -> String {
        self.plugin.read().await.version().to_string()
    }

    pub(crate) async fn event_keys(&self) -> Vec<String> {
        self.plugin.read().await.subscriptions()
    }

    /// Applies `config` and keeps it on success.
    pub(crate) async fn load_config(&self, config: PluginConfig) -> Result<(), PluginError> {
        self.plugin.write().await.on_load_config(&config)?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    pub(crate) async fn startup(&self) -> Result<(), PluginError> {
        self.plugin.read().await.on_startup(self.context.clone()).await
    }
}

#[async_trait]
impl EventHandler for PluginInstance {
    async fn handle(&self, event: &Event) -> Result<Dispatch, EventError> {
        let plugin = self.plugin.read().await;
        plugin
            .on_event(event, &self.context)
            .await
            .map_err(|e| EventError::HandlerExecution(e.to_string()))
    }

    fn handler_name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}
