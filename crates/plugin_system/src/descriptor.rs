//! Plugin descriptors: what the configuration asks for and what each plugin needs.

use crate::error::PluginError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Requirements a plugin factory declares.
///
/// Empty `requires_parsers` / `requires_storage` lists accept any game or
/// storage backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginRequirements {
    pub requires_config_file: bool,
    pub requires_version: Option<String>,
    pub requires_parsers: Vec<String>,
    pub requires_storage: Vec<String>,
    /// Hard dependencies: loaded before this plugin, or this plugin is excluded.
    pub requires_plugins: Vec<String>,
    /// Soft dependencies: ordering only, ignored when absent.
    pub load_after_plugins: Vec<String>,
}

impl PluginRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_file(mut self) -> Self {
        self.requires_config_file = true;
        self
    }

    pub fn min_version(mut self, version: &str) -> Self {
        self.requires_version = Some(version.to_string());
        self
    }

    pub fn parsers(mut self, games: &[&str]) -> Self {
        self.requires_parsers = games.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn storage(mut self, protocols: &[&str]) -> Self {
        self.requires_storage = protocols.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn requires(mut self, plugins: &[&str]) -> Self {
        self.requires_plugins = plugins.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn load_after(mut self, plugins: &[&str]) -> Self {
        self.load_after_plugins = plugins.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// One `[[plugins]]` entry of the application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<PathBuf>,
    #[serde(default)]
    pub disabled: bool,
}

impl PluginEntry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            config: None,
            disabled: false,
        }
    }

    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

/// A plugin's parsed TOML configuration file.
#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    path: Option<PathBuf>,
    table: toml::Table,
}

impl PluginConfig {
    /// Configuration with no file and no settings.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses TOML text, remembering `path` as its origin.
    pub fn from_toml(text: &str, path: Option<PathBuf>) -> Result<Self, PluginError> {
        let table = text.parse::<toml::Table>()?;
        Ok(Self { path, table })
    }

    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// The I/O error kind is preserved so callers can tell a missing file
    /// from an unreadable or unparseable one.
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text, Some(path.to_path_buf())).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: {}", path.display(), e),
            )
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn table(&self) -> &toml::Table {
        &self.table
    }

    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.table.get(key)
    }

    /// Deserializes the whole table into `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, PluginError> {
        toml::Value::Table(self.table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| PluginError::Config(e.to_string()))
    }
}
