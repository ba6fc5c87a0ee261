//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that wires the event bus,
//! RCON client, plugin storage and plugins together, starts the log reader
//! and coordinates the two-phase shutdown.

use crate::config::AppConfig;
use crate::error::AppError;
use crate::logging::display_banner;
use crate::pipeline::{PipelineSettings, ReadPipeline};
use crate::signals::{setup_signal_handlers, spawn_merciless_shutdown, spawn_reload_listener};
use plugin_admin::AdminFactory;
use plugin_chatlog::ChatLogFactory;
use plugin_system::{open_storage, PluginContext, PluginRegistry, PluginScheduler, Storage};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use warden_event_system::{
    keys, Event, EventBus, EventCatalog, EventError, ShutdownState, TaskScheduler,
};
use warden_parser::{games, LineDecoder, LogReader};
use warden_rcon::RconClient;

/// Registry holding every plugin shipped with Warden.
pub fn builtin_registry() -> Arc<PluginRegistry> {
    let registry = PluginRegistry::new();
    registry.register(Arc::new(AdminFactory));
    registry.register(Arc::new(ChatLogFactory));
    Arc::new(registry)
}

/// Main application struct.
///
/// Holds the validated configuration and the plugin factories until
/// [`start`](Self::start) builds the running system from them.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Factories the configured plugins are created from
    registry: Arc<PluginRegistry>,
}

impl Application {
    /// Creates an application using the built-in plugins.
    pub fn new(config: AppConfig) -> Self {
        Self::with_registry(config, builtin_registry())
    }

    pub fn with_registry(config: AppConfig, registry: Arc<PluginRegistry>) -> Self {
        Self { config, registry }
    }

    /// Builds every collaborator, loads the plugins and starts the pipeline.
    ///
    /// # Returns
    ///
    /// The running system, or the first fatal startup error. Anything opened
    /// before the failure is closed again.
    ///
    /// # Process
    ///
    /// 1. Load the game grammar and open the log source
    /// 2. Construct the RCON client and plugin storage
    /// 3. Start the dispatcher and load plugins in dependency order
    /// 4. Publish the startup event and start the reader thread
    pub async fn start(self) -> Result<Running, AppError> {
        display_banner();
        self.log_configuration_summary();
        let Application { config, registry } = self;

        let catalog = Arc::new(EventCatalog::standard());
        let bus = Arc::new(EventBus::new(catalog.clone(), config.bus.to_bus_config()));

        let (grammar, translator) = games::load(&config.server.game, catalog.clone())
            .map_err(|e| AppError::Config(e.to_string()))?;
        let game = games::canonical_name(&config.server.game).unwrap_or_default();
        let reader = LogReader::open(&config.server.log_file, config.server.read_from_start)
            .map_err(AppError::LogSource)?;

        let rcon = Arc::new(RconClient::connect(config.rcon.clone()).await?);
        let storage = match open_storage(&config.storage.protocol, config.storage.path.as_deref()) {
            Ok(storage) => storage,
            Err(e) => {
                rcon.close().await;
                return Err(AppError::Storage(e));
            }
        };
        info!("💾 Plugin storage: {}", storage.protocol());

        let timers = Arc::new(TaskScheduler::start());
        let context = Arc::new(PluginContext::new(
            bus.clone(),
            rcon.clone(),
            storage.clone(),
            timers.clone(),
            game,
        ));
        let scheduler = Arc::new(PluginScheduler::new(registry, context));
        let dispatcher = tokio::spawn(bus.clone().run());

        let mut running = Running {
            config,
            shutdown_state: ShutdownState::new(),
            bus,
            rcon,
            storage,
            timers,
            scheduler,
            dispatcher,
            reader: None,
            reload: None,
        };

        let outcome = running.scheduler.load_all(&running.config.plugins).await;
        let loaded = match outcome {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("❌ Plugin loading failed: {}", e);
                running.shutdown().await;
                return Err(AppError::Plugins(e));
            }
        };
        let names: Vec<&str> = loaded.iter().map(|p| p.name()).collect();
        info!("🔌 Plugins loaded in order: {}", names.join(", "));

        match running.bus.event_id(keys::EVT_STARTUP) {
            Ok(startup) => {
                running.bus.publish_default(Event::signal(startup)).await;
            }
            Err(e) => warn!("⚠️ Startup event not announced: {}", e),
        }

        let pipeline = ReadPipeline::new(
            reader,
            LineDecoder::new(grammar),
            translator,
            running.bus.clone(),
            PipelineSettings::from(&running.config.server),
        );
        match pipeline.spawn(Handle::current(), running.shutdown_state.clone()) {
            Ok(reader) => running.reader = Some(reader),
            Err(e) => {
                error!("❌ Failed to start the log reader thread: {}", e);
                running.shutdown().await;
                return Err(AppError::Runtime(format!("reader thread: {e}")));
            }
        }

        let scheduler = running.scheduler.clone();
        running.reload = Some(spawn_reload_listener(running.shutdown_state.clone(), move || {
            let scheduler = scheduler.clone();
            async move {
                let reloaded = scheduler.reload_configs().await;
                info!("🔄 {} plugin configuration(s) reloaded", reloaded);
            }
        }));

        Ok(running)
    }

    /// Runs until a termination signal arrives, then shuts down gracefully.
    pub async fn run(self) -> Result<(), AppError> {
        info!("🌟 Starting Warden");
        let running = self.start().await?;

        info!("✅ Warden is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown, send SIGHUP to reload plugin configs");

        let waited = setup_signal_handlers(running.shutdown_state())
            .await
            .map_err(|e| AppError::Runtime(format!("signal handling: {e}")));
        let _merciless = spawn_merciless_shutdown();

        running.shutdown().await;
        info!("👋 Warden shutdown complete");
        waited
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🎮 Game: {}", self.config.server.game);
        info!(
            "  📜 Log file: {} (from {})",
            self.config.server.log_file.display(),
            if self.config.server.read_from_start { "start" } else { "end" }
        );
        info!("  📡 RCON: {}", self.config.rcon.address);
        info!(
            "  🚦 Event queue: {} slots, {}s TTL",
            self.config.bus.queue_capacity, self.config.bus.default_ttl_secs
        );
        info!("  🔌 Plugins configured: {}", self.config.plugins.len());
    }
}

/// A started system, returned by [`Application::start`].
pub struct Running {
    config: AppConfig,
    shutdown_state: ShutdownState,
    bus: Arc<EventBus>,
    rcon: Arc<RconClient>,
    storage: Arc<dyn Storage>,
    timers: Arc<TaskScheduler>,
    scheduler: Arc<PluginScheduler>,
    dispatcher: JoinHandle<Result<(), EventError>>,
    reader: Option<std::thread::JoinHandle<crate::pipeline::PipelineStats>>,
    reload: Option<JoinHandle<()>>,
}

impl Running {
    pub fn shutdown_state(&self) -> &ShutdownState {
        &self.shutdown_state
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn scheduler(&self) -> &Arc<PluginScheduler> {
        &self.scheduler
    }

    /// Two-phase shutdown: stop reading, drain the queue, then close
    /// collaborators in order.
    pub async fn shutdown(mut self) {
        info!("🛑 Beginning graceful shutdown...");

        // Phase 1: no new lines
        info!("📡 Phase 1: Stopping the log reader...");
        self.shutdown_state.initiate_shutdown();
        if let Some(reader) = self.reader.take() {
            match tokio::task::spawn_blocking(move || reader.join()).await {
                Ok(Ok(_)) => info!("✅ Log reader stopped"),
                Ok(Err(_)) => error!("❌ Log reader thread panicked"),
                Err(e) => error!("❌ Failed to join the log reader: {}", e),
            }
        }

        // Phase 2: let the dispatcher finish what is queued
        info!("⏳ Phase 2: Processing remaining events...");
        self.bus.request_stop().await;
        let join_timeout = self.config.bus.join_timeout();
        match tokio::time::timeout(join_timeout, &mut self.dispatcher).await {
            Ok(Ok(Ok(()))) => info!("✅ All queued events processed"),
            Ok(Ok(Err(e))) => error!("❌ Dispatcher error: {}", e),
            Ok(Err(e)) => error!("❌ Dispatcher task failed: {}", e),
            Err(_) => {
                warn!(
                    "⏰ Dispatcher did not stop within {:?}, proceeding with shutdown",
                    join_timeout
                );
                self.dispatcher.abort();
            }
        }

        // Phase 3: plugins
        info!("🔌 Phase 3: Unloading plugins...");
        self.scheduler.shutdown();

        // Phase 4: collaborators
        info!("🧹 Phase 4: Closing RCON, storage and timers...");
        self.rcon.close().await;
        if let Err(e) = self.storage.close().await {
            error!("❌ Failed to close plugin storage: {}", e);
        }
        self.timers.shutdown().await;
        if let Some(reload) = self.reload.take() {
            if let Err(e) = reload.await {
                warn!("⚠️ Reload listener ended abnormally: {}", e);
            }
        }

        self.log_final_statistics();
        self.shutdown_state.complete_shutdown();
    }

    /// Logs final statistics during shutdown.
    fn log_final_statistics(&self) {
        let bus = self.bus.stats();
        let rcon = self.rcon.stats();
        info!("📊 Final Statistics:");
        info!(
            "  - Events: {} published, {} dispatched, {} vetoed",
            bus.published, bus.dispatched, bus.vetoes
        );
        info!(
            "  - Dropped: {} queue full, {} expired",
            bus.queue_full, bus.dropped_expired
        );
        info!(
            "  - Handlers: {} failures, {} slow",
            bus.handler_failures, bus.slow_handlers
        );
        info!(
            "  - RCON: {} commands, {} attempts, {} failures",
            rcon.commands, rcon.attempts, rcon.failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageSettings;
    use std::path::Path;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    async fn config_for(dir: &Path) -> (AppConfig, UdpSocket) {
        // Silent RCON peer: commands are accepted and never answered.
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut config = AppConfig::default();
        config.server.log_file = dir.join("games.log");
        config.server.read_from_start = true;
        config.server.poll_interval_ms = 10;
        config.rcon.address = peer.local_addr().unwrap().to_string();
        config.rcon.timeout_ms = 50;
        config.rcon.budget_ms = 200;
        config.bus.join_timeout_secs = 5;
        (config, peer)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_chat_flows_from_log_to_storage() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, _peer) = config_for(dir.path()).await;
        let store = dir.path().join("store.json");
        config.storage = StorageSettings {
            protocol: "json".to_string(),
            path: Some(store.clone()),
        };
        std::fs::write(
            &config.server.log_file,
            "  0:00 ClientConnect: 2\n  0:01 say: 2 Bob: hello\n  0:02 say: 2 Bob: again\n",
        )
        .unwrap();

        let running = Application::new(config).start().await.unwrap();
        let names: Vec<String> = running
            .scheduler()
            .instances()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["admin", "chatlog"]);

        let storage = running.scheduler().context().storage().clone();
        let counted = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(count) = storage.get("chatlog:count:Bob").await.unwrap() {
                    if count == 2 {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(counted.is_ok(), "chat lines were not counted");

        let shutdown = running.shutdown_state().clone();
        running.shutdown().await;
        assert!(shutdown.is_shutdown_complete());

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&store).unwrap()).unwrap();
        assert_eq!(saved["chatlog:count:Bob"], 2);
    }

    #[tokio::test]
    async fn test_missing_log_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (config, _peer) = config_for(dir.path()).await;

        let err = Application::new(config).start().await.err().unwrap();
        assert!(matches!(err, AppError::LogSource(_)));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_unknown_storage_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, _peer) = config_for(dir.path()).await;
        std::fs::write(&config.server.log_file, "").unwrap();
        config.storage.protocol = "redis".to_string();

        let err = Application::new(config).start().await.err().unwrap();
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn test_missing_admin_plugin_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (config, _peer) = config_for(dir.path()).await;
        std::fs::write(&config.server.log_file, "").unwrap();

        let registry = Arc::new(PluginRegistry::new());
        registry.register(Arc::new(ChatLogFactory));
        let err = Application::with_registry(config, registry)
            .start()
            .await
            .err()
            .unwrap();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_game_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, _peer) = config_for(dir.path()).await;
        config.server.game = "pong".to_string();

        let err = Application::new(config).start().await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
