//! Error types for the plugin system.

use thiserror::Error;
use warden_event_system::EventError;

/// Errors raised while loading or managing the plugin set.
#[derive(Error, Debug)]
pub enum PluginSystemError {
    /// The `admin` plugin is not available after resolution.
    #[error("Mandatory plugin missing: {0}")]
    MandatoryPluginMissing(String),

    /// The `admin` plugin was found but could not be loaded or started.
    #[error("Mandatory plugin {name} failed: {reason}")]
    MandatoryPluginFailed { name: String, reason: String },

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Operation refused: {0}")]
    Refused(String),

    /// No storage backend implements the configured protocol.
    #[error("Unsupported storage protocol: {0}")]
    UnsupportedStorage(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Event system error: {0}")]
    EventSystemError(#[from] EventError),
}

/// Errors reported by individual plugins.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Plugin initialization failed during startup
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),
    /// The plugin's configuration is missing or invalid
    #[error("Plugin configuration error: {0}")]
    Config(String),
    /// Error occurred during plugin execution
    #[error("Plugin execution error: {0}")]
    ExecutionError(String),
    /// A storage operation failed
    #[error("Plugin storage error: {0}")]
    Storage(String),
    /// Runtime error such as panic or system failure
    #[error("Plugin runtime error: {0}")]
    Runtime(String),
}

impl From<toml::de::Error> for PluginError {
    fn from(err: toml::de::Error) -> Self {
        PluginError::Config(err.to_string())
    }
}
