//! Shutdown coordination shared by the reader thread, the dispatcher and the
//! application owner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Shared shutdown state for the two-phase shutdown.
///
/// Phase one (`initiate_shutdown`) tells producers to stop reading; phase two
/// (`complete_shutdown`) is set by the owner once the dispatcher has drained
/// and collaborators are closed.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    /// Flag indicating shutdown has been initiated - no new lines should be read
    shutdown_initiated: Arc<AtomicBool>,
    /// Flag indicating the dispatcher drained and final cleanup finished
    shutdown_complete: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownState {
    /// Creates a new shutdown state with both flags set to false.
    pub fn new() -> Self {
        Self {
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            shutdown_complete: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.load(Ordering::Acquire)
    }

    /// Initiates shutdown and wakes every task waiting in [`wait`](Self::wait).
    pub fn initiate_shutdown(&self) {
        if !self.shutdown_initiated.swap(true, Ordering::AcqRel) {
            info!("🛑 Shutdown initiated - no new log lines will be read");
        }
        self.notify.notify_waiters();
    }

    /// Marks shutdown as complete.
    pub fn complete_shutdown(&self) {
        self.shutdown_complete.store(true, Ordering::Release);
        info!("✅ Event pipeline drained - shutdown complete");
    }

    /// Resolves once shutdown has been initiated.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_shutdown_initiated() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_initiation() {
        let state = ShutdownState::new();
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!state.is_shutdown_initiated());
        state.initiate_shutdown();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(state.is_shutdown_initiated());
        assert!(!state.is_shutdown_complete());
    }

    #[tokio::test]
    async fn test_wait_after_initiation_is_immediate() {
        let state = ShutdownState::new();
        state.initiate_shutdown();
        tokio::time::timeout(Duration::from_millis(100), state.wait())
            .await
            .expect("already initiated");
        state.complete_shutdown();
        assert!(state.is_shutdown_complete());
    }
}
