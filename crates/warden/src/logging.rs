//! Logging system setup and configuration.
//!
//! This module handles the initialization and configuration of the tracing-based
//! logging system with support for both human-readable and JSON output formats,
//! optionally mirrored to a file.

use crate::config::LoggingSettings;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system with the specified configuration.
///
/// # Arguments
///
/// * `config` - Logging configuration from the config file
/// * `json_format` - Whether to force JSON output format (CLI override)
///
/// # Returns
///
/// `Ok(())` if logging was set up successfully, or an error if the log file
/// could not be opened or a global subscriber is already installed.
///
/// # Features
///
/// * **Environment variable support** - Respects `RUST_LOG` if set
/// * **Flexible formatting** - Human-readable or JSON output
/// * **Thread information** - Includes thread IDs and names, so the reader
///   thread is distinguishable from the dispatcher
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let json = json_format || config.json_format;

    let (json_layer, text_layer) = if json {
        let layer = fmt::layer()
            .json()
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(true)
            .with_thread_names(true);
        (Some(layer), None)
    } else {
        let layer = fmt::layer()
            .with_ansi(true)
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(true)
            .with_thread_names(true);
        (None, Some(layer))
    };

    let file = match &config.file_path {
        Some(path) => Some(Mutex::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };
    let (json_file_layer, text_file_layer) = match file {
        Some(writer) if json => (Some(fmt::layer().json().with_writer(writer)), None),
        Some(writer) => (
            None,
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_thread_names(true)
                    .with_writer(writer),
            ),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(json_file_layer)
        .with(text_file_layer)
        .try_init()?;

    info!("🔧 Logging initialized with level: {}", log_level);
    if let Some(path) = &config.file_path {
        info!("📝 Mirroring logs to {}", path);
    }
    Ok(())
}

/// Displays the startup banner using proper logging.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║              🛡️  WARDEN 🛡️                ║");
    info!("║         Game Server Supervisor v{}    ║", version);
    info!("║                                          ║");
    info!("║  📜 Log-Driven Events                    ║");
    info!("║  🔌 Ordered Plugin Loading               ║");
    info!("║  📡 RCON Command Channel                 ║");
    info!("║                                          ║");
    info!("╚══════════════════════════════════════════╝");
}
