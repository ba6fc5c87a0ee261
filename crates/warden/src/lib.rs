//! # Warden - Game Server Supervisor
//!
//! Follows a game server's log, turns each line into a typed event, hands the
//! events to plugins in dependency order and lets plugins talk back to the
//! server over RCON.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration (warden.toml is created if missing)
//! warden
//!
//! # Specify custom configuration
//! warden --config production.toml
//!
//! # Override specific settings
//! warden --log-file /srv/q3/games.log --rcon 127.0.0.1:27960 --log-level debug
//!
//! # JSON logging for production
//! warden --json-logs
//! ```
//!
//! ## Signal Handling
//!
//! - SIGINT (Ctrl+C) / SIGTERM: graceful two-phase shutdown; a second signal exits at once
//! - SIGHUP (Unix systems): plugin configuration files are re-read
//!
//! ## Exit Codes
//!
//! See [`AppError::exit_code`]; a clean shutdown exits with 0.

use tracing::{error, info};

mod app;
mod cli;
mod config;
mod error;
mod logging;
mod pipeline;
mod signals;

pub use app::{builtin_registry, Application, Running};
pub use cli::CliArgs;
pub use config::{AppConfig, BusSettings, LoggingSettings, ServerSettings, StorageSettings};
pub use error::AppError;
pub use pipeline::{PipelineSettings, PipelineStats, ReadPipeline};

/// Main entry point for Warden.
///
/// Handles the complete application lifecycle:
/// 1. Command-line argument parsing
/// 2. Configuration loading, overrides and validation
/// 3. Logging system initialization
/// 4. Application startup, run and shutdown
///
/// # Returns
///
/// The process exit code.
pub async fn init() -> i32 {
    let args = CliArgs::parse();

    let mut config = match AppConfig::load_from_file(&args.config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "❌ Failed to load configuration from {}: {e}",
                args.config_path.display()
            );
            return 1;
        }
    };
    config.apply_overrides(&args);

    // Setup logging before anything else
    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        return 1;
    }

    if let Err(e) = config.validate() {
        let err = AppError::Config(format!("validation failed: {e}"));
        error!("❌ {}", err);
        return err.exit_code();
    }
    info!(
        "✅ Configuration loaded and validated from {}",
        args.config_path.display()
    );

    match Application::new(config).run().await {
        Ok(()) => 0,
        Err(e) => {
            error!("❌ Application error: {}", e);
            e.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_plugins_registered() {
        let registry = builtin_registry();
        assert!(registry.contains("admin"));
        assert!(registry.contains("chatlog"));
    }

    #[test]
    fn test_default_config_names_builtin_plugins() {
        let config = AppConfig::default();
        let registry = builtin_registry();
        assert!(config.plugins.iter().all(|p| registry.contains(&p.name)));
    }
}
