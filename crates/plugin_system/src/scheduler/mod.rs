//! Dependency-aware plugin loading.
//!
//! [`PluginScheduler::load_all`] turns the configured plugin entries into a
//! running, ordered plugin set:
//!
//! 1. Resolve entries against the [`PluginRegistry`] and read config files
//! 2. Auto-load hard requirements that were not configured
//! 3. Validate version, game and storage requirements
//! 4. Drop dependency cycles and sort the rest (`admin` always first)
//! 5. Instantiate, configure, register handlers and start each plugin
//!
//! A plugin that fails any step is excluded, and so is everything that
//! hard-requires it. Failures of the mandatory `admin` plugin are fatal.

#[cfg(test)]
mod tests;

use crate::context::PluginContext;
use crate::descriptor::{PluginConfig, PluginEntry, PluginRequirements};
use crate::error::PluginSystemError;
use crate::graph::{find_cycles, load_order, Node};
use crate::plugin::PluginInstance;
use crate::registry::{PluginFactory, PluginRegistry};
use crate::version::{check_minimum, WARDEN_VERSION};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info, warn};
use warden_event_system::EventHandler;

/// Name of the plugin that must always be loaded, enabled and first.
pub const ADMIN_PLUGIN: &str = "admin";

struct Candidate {
    entry: PluginEntry,
    factory: Arc<dyn PluginFactory>,
    requirements: PluginRequirements,
    config: PluginConfig,
}

/// Bookkeeping for one `load_all` run.
#[derive(Default)]
struct Resolution {
    candidates: Vec<Candidate>,
    excluded: HashMap<String, String>,
}

impl Resolution {
    fn find(&self, name: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.entry.name == name)
    }

    fn is_known(&self, name: &str) -> bool {
        self.find(name).is_some() || self.excluded.contains_key(name)
    }

    fn is_live(&self, name: &str) -> bool {
        self.find(name).is_some() && !self.excluded.contains_key(name)
    }

    fn live(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates
            .iter()
            .filter(move |c| !self.excluded.contains_key(&c.entry.name))
    }

    fn exclude(&mut self, name: &str, reason: String) -> Result<(), PluginSystemError> {
        if name == ADMIN_PLUGIN {
            error!("❌ Mandatory plugin {} failed: {}", name, reason);
            return Err(PluginSystemError::MandatoryPluginFailed {
                name: name.to_string(),
                reason,
            });
        }
        if !self.excluded.contains_key(name) {
            error!("❌ Excluding plugin {}: {}", name, reason);
            self.excluded.insert(name.to_string(), reason);
        }
        Ok(())
    }

    /// Excludes plugins whose hard requirements are no longer available,
    /// until nothing changes.
    fn propagate(&mut self) -> Result<(), PluginSystemError> {
        loop {
            let broken: Vec<(String, String)> = self
                .live()
                .filter_map(|c| {
                    c.requirements
                        .requires_plugins
                        .iter()
                        .find(|dep| !self.is_live(dep))
                        .map(|dep| {
                            (
                                c.entry.name.clone(),
                                format!("required plugin {} is unavailable", dep),
                            )
                        })
                })
                .collect();

            if broken.is_empty() {
                return Ok(());
            }
            for (name, reason) in broken {
                self.exclude(&name, reason)?;
            }
        }
    }

    /// Graph nodes for live plugins other than `admin`.
    fn nodes(&self) -> Vec<Node> {
        self.live()
            .filter(|c| c.entry.name != ADMIN_PLUGIN)
            .map(|c| Node {
                name: c.entry.name.clone(),
                after: c
                    .requirements
                    .requires_plugins
                    .iter()
                    .chain(c.requirements.load_after_plugins.iter())
                    .filter(|dep| dep.as_str() != ADMIN_PLUGIN)
                    .cloned()
                    .collect(),
            })
            .collect()
    }
}

/// Loads plugins in dependency order and manages them afterwards.
pub struct PluginScheduler {
    registry: Arc<PluginRegistry>,
    context: Arc<PluginContext>,
    instances: RwLock<Vec<Arc<PluginInstance>>>,
}

impl std::fmt::Debug for PluginScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginScheduler")
            .field("registry", &self.registry)
            .field("loaded", &self.instances().len())
            .finish()
    }
}

impl PluginScheduler {
    pub fn new(registry: Arc<PluginRegistry>, context: Arc<PluginContext>) -> Self {
        Self {
            registry,
            context,
            instances: RwLock::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &Arc<PluginContext> {
        &self.context
    }

    /// Loads and starts every plugin named in `entries`.
    ///
    /// # Arguments
    ///
    /// * `entries` - Plugin entries in declaration order
    ///
    /// # Returns
    ///
    /// The loaded instances in load order (`admin` first), or a fatal error
    /// when the `admin` plugin is missing or fails.
    pub async fn load_all(
        &self,
        entries: &[PluginEntry],
    ) -> Result<Vec<Arc<PluginInstance>>, PluginSystemError> {
        if !self.instances().is_empty() {
            return Err(PluginSystemError::Refused("plugins are already loaded".to_string()));
        }
        info!("🔌 Loading {} configured plugin(s)", entries.len());

        let mut resolution = Resolution::default();
        for entry in entries {
            self.resolve_entry(&mut resolution, entry.clone())?;
        }
        if resolution.find(ADMIN_PLUGIN).is_none() {
            if !self.registry.contains(ADMIN_PLUGIN) {
                error!("❌ Mandatory plugin {} is not available", ADMIN_PLUGIN);
                return Err(PluginSystemError::MandatoryPluginMissing(ADMIN_PLUGIN.to_string()));
            }
            warn!("⚠️ {} plugin not configured, loading it with defaults", ADMIN_PLUGIN);
            self.resolve_entry(&mut resolution, PluginEntry::new(ADMIN_PLUGIN))?;
        }

        self.auto_load_requirements(&mut resolution)?;
        self.validate(&mut resolution)?;

        let cycles = find_cycles(&resolution.nodes());
        for cycle in cycles {
            let reason = format!("dependency cycle between {}", cycle.join(", "));
            for name in &cycle {
                resolution.exclude(name, reason.clone())?;
            }
        }
        resolution.propagate()?;

        let order: Vec<String> = std::iter::once(ADMIN_PLUGIN.to_string())
            .chain(load_order(&resolution.nodes()))
            .collect();
        info!("📋 Plugin load order: {}", order.join(" → "));

        let loaded = self.instantiate(&mut resolution, &order).await?;
        self.register_handlers(&loaded).await;
        *self.instances.write().unwrap_or_else(PoisonError::into_inner) = loaded.clone();

        for instance in &loaded {
            match instance.startup().await {
                Ok(()) => {
                    let version = instance.version().await;
                    info!("✅ Plugin started: {} v{}", instance.name(), version);
                }
                Err(e) if instance.name() == ADMIN_PLUGIN => {
                    error!("❌ Mandatory plugin {} failed to start: {}", ADMIN_PLUGIN, e);
                    self.shutdown();
                    return Err(PluginSystemError::MandatoryPluginFailed {
                        name: ADMIN_PLUGIN.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    error!("❌ Plugin {} failed to start, disabling: {}", instance.name(), e);
                    instance.set_enabled(false);
                }
            }
        }

        info!(
            "🎉 Plugin loading complete: {} loaded, {} excluded",
            loaded.len(),
            resolution.excluded.len()
        );
        Ok(loaded)
    }

    fn resolve_entry(
        &self,
        resolution: &mut Resolution,
        entry: PluginEntry,
    ) -> Result<(), PluginSystemError> {
        if resolution.is_known(&entry.name) {
            warn!("⚠️ Plugin {} listed more than once, ignoring duplicate", entry.name);
            return Ok(());
        }

        let Some(factory) = self.registry.get(&entry.name) else {
            if entry.name == ADMIN_PLUGIN {
                error!("❌ Mandatory plugin {} is not available", ADMIN_PLUGIN);
                return Err(PluginSystemError::MandatoryPluginMissing(entry.name));
            }
            return resolution.exclude(&entry.name, "no such plugin is registered".to_string());
        };

        let requirements = factory.requirements();
        match read_config(&entry, &requirements) {
            Ok(config) => {
                resolution.candidates.push(Candidate {
                    entry,
                    factory,
                    requirements,
                    config,
                });
                Ok(())
            }
            Err(reason) => resolution.exclude(&entry.name, reason),
        }
    }

    fn auto_load_requirements(&self, resolution: &mut Resolution) -> Result<(), PluginSystemError> {
        let mut next = 0;
        while next < resolution.candidates.len() {
            let dependent = resolution.candidates[next].entry.name.clone();
            let wanted = resolution.candidates[next].requirements.requires_plugins.clone();
            for dep in wanted {
                if !resolution.is_known(&dep) && self.registry.contains(&dep) {
                    info!("➕ Auto-loading plugin {} required by {}", dep, dependent);
                    self.resolve_entry(resolution, PluginEntry::new(&dep))?;
                }
            }
            next += 1;
        }
        resolution.propagate()
    }

    fn validate(&self, resolution: &mut Resolution) -> Result<(), PluginSystemError> {
        let game = self.context.game().to_ascii_lowercase();
        let protocol = self.context.storage().protocol().to_string();

        let failures: Vec<(String, String)> = resolution
            .live()
            .filter_map(|c| {
                let req = &c.requirements;
                let reason = if let Some(Err(reason)) = req
                    .requires_version
                    .as_deref()
                    .map(|v| check_minimum(v, WARDEN_VERSION))
                {
                    reason
                } else if !req.requires_parsers.is_empty()
                    && !req.requires_parsers.iter().any(|g| g.to_ascii_lowercase() == game)
                {
                    format!("does not support game {}", game)
                } else if !req.requires_storage.is_empty()
                    && !req.requires_storage.iter().any(|p| *p == protocol)
                {
                    format!("does not support storage protocol {}", protocol)
                } else {
                    return None;
                };
                Some((c.entry.name.clone(), reason))
            })
            .collect();

        for (name, reason) in failures {
            resolution.exclude(&name, reason)?;
        }
        resolution.propagate()
    }

    async fn instantiate(
        &self,
        resolution: &mut Resolution,
        order: &[String],
    ) -> Result<Vec<Arc<PluginInstance>>, PluginSystemError> {
        let mut loaded = Vec::with_capacity(order.len());
        let mut failed: HashSet<String> = HashSet::new();

        for name in order {
            let Some(candidate) = resolution.find(name) else {
                continue;
            };
            if let Some(dep) = candidate
                .requirements
                .requires_plugins
                .iter()
                .find(|dep| failed.contains(dep.as_str()))
            {
                let reason = format!("required plugin {} failed to load", dep);
                resolution.exclude(name, reason)?;
                failed.insert(name.clone());
                continue;
            }

            let enabled = if name == ADMIN_PLUGIN {
                if candidate.entry.disabled {
                    warn!("⚠️ {} plugin cannot be disabled, enabling it", ADMIN_PLUGIN);
                }
                true
            } else {
                !candidate.entry.disabled
            };

            let instance = Arc::new(PluginInstance::new(
                candidate.entry.clone(),
                candidate.requirements.clone(),
                candidate.factory.create(),
                PluginConfig::empty(),
                enabled,
                self.context.clone(),
            ));
            let config = candidate.config.clone();

            if let Err(e) = instance.load_config(config).await {
                resolution.exclude(name, format!("configuration rejected: {}", e))?;
                failed.insert(name.clone());
                continue;
            }
            if !enabled {
                info!("⏸️ Plugin {} loaded disabled", name);
            }
            loaded.push(instance);
        }
        Ok(loaded)
    }

    async fn register_handlers(&self, loaded: &[Arc<PluginInstance>]) {
        let bus = self.context.bus();
        for instance in loaded {
            let handler: Arc<dyn EventHandler> = instance.clone();
            let ids: Vec<_> = instance
                .event_keys()
                .await
                .iter()
                .map(|key| bus.register_handler_for_key(key, handler.clone()))
                .collect();
            info!("📡 Plugin {} subscribed to {} event(s)", instance.name(), ids.len());
            instance.set_subscriptions(ids);
        }
    }

    /// Looks a loaded plugin up by name.
    pub fn plugin(&self, name: &str) -> Option<Arc<PluginInstance>> {
        self.instances().into_iter().find(|p| p.name() == name)
    }

    /// Loaded plugins in load order.
    pub fn instances(&self) -> Vec<Arc<PluginInstance>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn enable(&self, name: &str) -> Result<(), PluginSystemError> {
        let instance = self
            .plugin(name)
            .ok_or_else(|| PluginSystemError::PluginNotFound(name.to_string()))?;
        instance.set_enabled(true);
        info!("▶️ Plugin enabled: {}", name);
        Ok(())
    }

    /// Disables a plugin. The `admin` plugin cannot be disabled.
    pub fn disable(&self, name: &str) -> Result<(), PluginSystemError> {
        if name == ADMIN_PLUGIN {
            warn!("⚠️ Refusing to disable the {} plugin", ADMIN_PLUGIN);
            return Err(PluginSystemError::Refused(format!("{} cannot be disabled", name)));
        }
        let instance = self
            .plugin(name)
            .ok_or_else(|| PluginSystemError::PluginNotFound(name.to_string()))?;
        instance.set_enabled(false);
        info!("⏸️ Plugin disabled: {}", name);
        Ok(())
    }

    /// Re-reads each plugin's config file and applies it.
    ///
    /// A plugin whose file cannot be read or is rejected keeps its previous
    /// configuration.
    ///
    /// # Returns
    ///
    /// The number of plugins reconfigured.
    pub async fn reload_configs(&self) -> usize {
        let mut reloaded = 0;
        for instance in self.instances() {
            let Some(path) = instance.config_path() else {
                continue;
            };
            let config = match PluginConfig::load(&path) {
                Ok(config) => config,
                Err(e) => {
                    error!("❌ Cannot reload config for {}: {}", instance.name(), e);
                    continue;
                }
            };
            match instance.load_config(config).await {
                Ok(()) => {
                    info!("🔄 Reloaded configuration for {}", instance.name());
                    reloaded += 1;
                }
                Err(e) => error!(
                    "❌ Plugin {} rejected its new configuration, keeping the old one: {}",
                    instance.name(),
                    e
                ),
            }
        }
        reloaded
    }

    /// Unregisters every plugin handler from the bus.
    pub fn shutdown(&self) {
        let instances =
            std::mem::take(&mut *self.instances.write().unwrap_or_else(PoisonError::into_inner));
        for instance in instances.iter().rev() {
            let handler: Arc<dyn EventHandler> = instance.clone();
            self.context.bus().unregister_handler(&handler);
        }
        info!("🛑 Unloaded {} plugin(s)", instances.len());
    }
}

fn read_config(entry: &PluginEntry, requirements: &PluginRequirements) -> Result<PluginConfig, String> {
    match &entry.config {
        None if requirements.requires_config_file => Err("a config file is required".to_string()),
        None => Ok(PluginConfig::empty()),
        Some(path) => match PluginConfig::load(path) {
            Ok(config) => Ok(config),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !requirements.requires_config_file => {
                warn!(
                    "⚠️ Config file {} for {} not found, using defaults",
                    path.display(),
                    entry.name
                );
                Ok(PluginConfig::empty())
            }
            Err(e) => Err(format!("cannot load config {}: {}", path.display(), e)),
        },
    }
}
