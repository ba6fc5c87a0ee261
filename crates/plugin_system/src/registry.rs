//! Registry of plugin factories, keyed by plugin name.

use crate::descriptor::PluginRequirements;
use crate::plugin::Plugin;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Creates plugin instances and declares what they need.
pub trait PluginFactory: Send + Sync {
    /// Name used in configuration and dependency lists.
    fn name(&self) -> &str;

    fn requirements(&self) -> PluginRequirements {
        PluginRequirements::default()
    }

    fn create(&self) -> Box<dyn Plugin>;
}

/// Explicit name → factory map consulted by the scheduler.
#[derive(Default)]
pub struct PluginRegistry {
    factories: DashMap<String, Arc<dyn PluginFactory>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("factories", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a factory. A second factory with the same name replaces the first.
    pub fn register(&self, factory: Arc<dyn PluginFactory>) {
        let name = factory.name().to_string();
        if self.factories.insert(name.clone(), factory).is_some() {
            warn!("⚠️ Plugin factory {} registered twice, keeping the latest", name);
        } else {
            debug!("📝 Registered plugin factory {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PluginFactory>> {
        self.factories.get(name).map(|f| f.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|f| f.key().clone()).collect();
        names.sort();
        names
    }
}
