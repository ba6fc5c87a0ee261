//! Signal handling for graceful supervisor shutdown and configuration reload.
//!
//! SIGINT and SIGTERM start the two-phase shutdown: first stop reading the
//! log, then drain the event queue before final cleanup. A second signal
//! during shutdown exits immediately. SIGHUP re-reads plugin configuration.

use std::future::Future;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use warden_event_system::ShutdownState;

/// Waits for a termination signal or for shutdown to be initiated elsewhere.
///
/// # Platform Support
///
/// * **Unix platforms**: Handles SIGINT and SIGTERM signals
/// * **Windows**: Handles Ctrl+C signal
///
/// # Returns
///
/// `Ok(())` once `shutdown` has been initiated, or an error if signal
/// handling setup failed.
pub async fn setup_signal_handlers(shutdown: &ShutdownState) -> Result<(), Box<dyn std::error::Error>> {
    tokio::select! {
        result = setup_signal_handlers_silent() => {
            result?;
            info!("📡 Received shutdown signal - initiating graceful shutdown");
        }
        _ = shutdown.wait() => {
            info!("📡 Shutdown requested internally - initiating graceful shutdown");
        }
    }
    shutdown.initiate_shutdown();
    Ok(())
}

/// Resolves when SIGINT or SIGTERM (Ctrl+C on Windows) is received.
pub async fn setup_signal_handlers_silent() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}

/// Exits the process on the next termination signal.
pub fn spawn_merciless_shutdown() -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = setup_signal_handlers_silent().await {
            error!("Failed to set up merciless shutdown signal handler: {e}");
            return;
        }

        warn!("Shutdown signal received again! I'll make this quick.");
        std::process::exit(1);
    })
}

/// Runs `on_reload` for every SIGHUP until shutdown is initiated.
///
/// On platforms without SIGHUP the task only waits for shutdown.
pub fn spawn_reload_listener<F, Fut>(shutdown: ShutdownState, on_reload: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use signal::unix::{signal, SignalKind};

            let mut sighup = match signal(SignalKind::hangup()) {
                Ok(sighup) => sighup,
                Err(e) => {
                    error!("❌ Failed to install SIGHUP handler, config reload disabled: {e}");
                    shutdown.wait().await;
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    received = sighup.recv() => {
                        if received.is_none() {
                            break;
                        }
                        info!("🔄 SIGHUP received - reloading plugin configuration");
                        on_reload().await;
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = on_reload;
            shutdown.wait().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_internal_shutdown_releases_waiter() {
        let shutdown = ShutdownState::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.initiate_shutdown();
        });

        tokio::time::timeout(Duration::from_secs(2), setup_signal_handlers(&shutdown))
            .await
            .expect("waiter should return once shutdown is initiated")
            .unwrap();
        assert!(shutdown.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_reload_listener_stops_with_shutdown() {
        let shutdown = ShutdownState::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = spawn_reload_listener(shutdown.clone(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        shutdown.initiate_shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("listener should exit")
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
