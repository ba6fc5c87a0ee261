//! Configuration management for Warden.
//!
//! This module handles loading and validation of the TOML configuration file
//! and the application of command-line overrides.

use crate::cli::CliArgs;
use plugin_system::PluginEntry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use warden_event_system::EventBusConfig;
use warden_parser::games::{canonical_name, SUPPORTED_GAMES};
use warden_rcon::RconConfig;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Game and log source settings
    pub server: ServerSettings,
    /// RCON connection settings
    pub rcon: RconConfig,
    /// Event queue settings
    #[serde(default)]
    pub bus: BusSettings,
    /// Plugin storage backend
    #[serde(default)]
    pub storage: StorageSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Plugins to load, in declaration order
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

/// Game and log source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bundled grammar to parse the log with (e.g. "q3a")
    pub game: String,
    /// Server log file to tail
    pub log_file: PathBuf,
    /// Replay the existing log content at startup instead of starting at its end
    #[serde(default)]
    pub read_from_start: bool,
    /// Delay between reads of the log file
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long the reader stays paused when the event queue is saturated
    #[serde(default = "default_overload_pause_ms")]
    pub overload_pause_ms: u64,
    /// Consecutive failed publishes that count as saturation
    #[serde(default = "default_overload_threshold")]
    pub overload_threshold: u32,
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_overload_pause_ms() -> u64 {
    1_000
}

fn default_overload_threshold() -> u32 {
    3
}

impl ServerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn overload_pause(&self) -> Duration {
        Duration::from_millis(self.overload_pause_ms)
    }
}

/// Longest queue TTL accepted from configuration (one day).
pub const MAX_EVENT_TTL_SECS: u64 = 86_400;

/// Event queue and dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub queue_capacity: usize,
    /// Seconds an event may wait in the queue before it is dropped
    pub default_ttl_secs: u64,
    /// Milliseconds a publisher waits for queue space (0 = try once)
    pub publish_timeout_ms: u64,
    /// Handler calls slower than this are logged
    pub slow_handler_ms: u64,
    /// Seconds to wait for the dispatcher to drain at shutdown
    pub join_timeout_secs: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        let defaults = EventBusConfig::default();
        Self {
            queue_capacity: defaults.queue_capacity,
            default_ttl_secs: defaults.default_ttl.as_secs(),
            publish_timeout_ms: defaults.publish_timeout.as_millis() as u64,
            slow_handler_ms: defaults.slow_handler_threshold.as_millis() as u64,
            join_timeout_secs: 15,
        }
    }
}

impl BusSettings {
    pub fn to_bus_config(&self) -> EventBusConfig {
        EventBusConfig {
            queue_capacity: self.queue_capacity,
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            publish_timeout: Duration::from_millis(self.publish_timeout_ms),
            slow_handler_threshold: Duration::from_millis(self.slow_handler_ms),
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

/// Plugin storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// "memory" or "json"
    pub protocol: String,
    /// Backing file for the json backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            protocol: "memory".to_string(),
            path: None,
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                game: "q3a".to_string(),
                log_file: PathBuf::from("games.log"),
                read_from_start: false,
                poll_interval_ms: default_poll_interval_ms(),
                overload_pause_ms: default_overload_pause_ms(),
                overload_threshold: default_overload_threshold(),
            },
            rcon: RconConfig::new("127.0.0.1:27960", "changeme"),
            bus: BusSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingSettings::default(),
            plugins: vec![
                PluginEntry::new("admin"),
                PluginEntry::new("chatlog"),
            ],
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, creating a default one if missing.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded or default configuration, or an error if loading/creation failed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file settings.
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(log_file) = &args.log_file {
            self.server.log_file = log_file.clone();
        }
        if let Some(game) = &args.game {
            self.server.game = game.clone();
        }
        if let Some(address) = &args.rcon {
            self.rcon.address = address.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    /// Validates the configuration settings.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error message describing
    /// the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if canonical_name(&self.server.game).is_none() {
            return Err(format!(
                "Unsupported game: {}. Must be one of: {SUPPORTED_GAMES:?}",
                self.server.game
            ));
        }

        if self.server.log_file.as_os_str().is_empty() {
            return Err("server.log_file cannot be empty".to_string());
        }

        if self.server.poll_interval_ms == 0 {
            return Err("server.poll_interval_ms must be greater than 0".to_string());
        }

        if self.server.overload_threshold == 0 {
            return Err("server.overload_threshold must be greater than 0".to_string());
        }

        self.rcon.validate()?;

        if self.bus.queue_capacity == 0 {
            return Err("bus.queue_capacity must be greater than 0".to_string());
        }

        if self.bus.default_ttl_secs == 0 || self.bus.default_ttl_secs > MAX_EVENT_TTL_SECS {
            return Err(format!(
                "bus.default_ttl_secs must be between 1 and {MAX_EVENT_TTL_SECS}"
            ));
        }

        match self.storage.protocol.as_str() {
            "memory" => {}
            "json" if self.storage.path.is_some() => {}
            "json" => return Err("storage.path is required for the json protocol".to_string()),
            other => return Err(format!("Unsupported storage protocol: {other}")),
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if let Some(entry) = self.plugins.iter().find(|p| p.name.trim().is_empty()) {
            return Err(format!("Plugin entry with empty name: {entry:?}"));
        }

        Ok(())
    }
}
