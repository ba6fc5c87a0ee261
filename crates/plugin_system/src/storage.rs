//! Opaque key/value storage shared by plugins.
//!
//! Two backends exist: `memory`, which lives for the process, and `json`,
//! which loads a JSON object from disk at startup and writes it back on flush
//! and close.

use crate::error::{PluginError, PluginSystemError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Key/value store handed to plugins through the context.
#[async_trait]
pub trait Storage: Send + Sync + Debug {
    /// Protocol name plugins can require (`memory`, `json`, ...).
    fn protocol(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<Value>, PluginError>;

    async fn put(&self, key: &str, value: Value) -> Result<(), PluginError>;

    async fn remove(&self, key: &str) -> Result<Option<Value>, PluginError>;

    /// Persists pending writes. A no-op for volatile backends.
    async fn flush(&self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), PluginError> {
        self.flush().await
    }
}

/// Opens the backend for `protocol`.
///
/// # Arguments
///
/// * `protocol` - `memory` or `json`
/// * `path` - Backing file, required by `json`
pub fn open_storage(protocol: &str, path: Option<&Path>) -> Result<Arc<dyn Storage>, PluginSystemError> {
    match protocol {
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        "json" => {
            let path = path.ok_or_else(|| {
                PluginSystemError::Storage("json storage needs a path".to_string())
            })?;
            Ok(Arc::new(JsonFileStorage::open(path)?))
        }
        other => Err(PluginSystemError::UnsupportedStorage(other.to_string())),
    }
}

/// Volatile in-process storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: DashMap<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn protocol(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, PluginError> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), PluginError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>, PluginError> {
        Ok(self.values.remove(key).map(|(_, v)| v))
    }
}

/// Storage persisted as a single JSON object.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    values: DashMap<String, Value>,
}

impl JsonFileStorage {
    /// Loads `path` if it exists; a missing file starts empty.
    pub fn open(path: &Path) -> Result<Self, PluginSystemError> {
        let values = DashMap::new();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let object: serde_json::Map<String, Value> = serde_json::from_str(&text)
                    .map_err(|e| PluginSystemError::Storage(format!("{}: {}", path.display(), e)))?;
                for (key, value) in object {
                    values.insert(key, value);
                }
                info!("💾 Loaded {} stored values from {}", values.len(), path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Storage file {} not found, starting empty", path.display());
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    fn protocol(&self) -> &str {
        "json"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, PluginError> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), PluginError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>, PluginError> {
        Ok(self.values.remove(key).map(|(_, v)| v))
    }

    async fn flush(&self) -> Result<(), PluginError> {
        let object: serde_json::Map<String, Value> = self
            .values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let text = serde_json::to_string_pretty(&object)
            .map_err(|e| PluginError::Storage(e.to_string()))?;
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| PluginError::Storage(format!("{}: {}", self.path.display(), e)))?;
        debug!("💾 Flushed {} values to {}", object.len(), self.path.display());
        Ok(())
    }
}
