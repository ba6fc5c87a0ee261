//! The RCON client.
//!
//! All traffic goes through one connected UDP socket behind an async mutex,
//! so at most one request is in flight per client. Fire-and-forget bursts are
//! handed to a worker task that is spawned on first use and shares the same
//! lock.

use crate::config::RconConfig;
use crate::error::RconError;
use crate::protocol::{decode_reply, encode_request, is_no_reply_command};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Largest datagram we expect from a game server.
const MAX_DATAGRAM: usize = 65_507;
/// Fallback horizon when a requested timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Counters for monitoring.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RconStats {
    /// Commands submitted through `send` or the burst worker
    pub commands: u64,
    /// Individual send attempts, including retries
    pub attempts: u64,
    /// Commands that exhausted their retries or budget
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    commands: AtomicU64,
    attempts: AtomicU64,
    failures: AtomicU64,
}

enum WorkerMessage {
    Batch(Vec<String>),
    Stop,
}

struct BurstWorker {
    queue: mpsc::UnboundedSender<WorkerMessage>,
    handle: JoinHandle<()>,
}

struct RconInner {
    config: RconConfig,
    peer: SocketAddr,
    socket: tokio::sync::Mutex<Option<UdpSocket>>,
    closed: AtomicBool,
    counters: Counters,
}

/// Remote console client for one game server.
pub struct RconClient {
    inner: Arc<RconInner>,
    worker: Mutex<Option<BurstWorker>>,
}

impl std::fmt::Debug for RconClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconClient")
            .field("peer", &self.inner.peer)
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl RconClient {
    /// Resolves the server address and binds a local socket connected to it.
    ///
    /// # Returns
    ///
    /// A ready client, or an `RconError` if the configuration is invalid, the
    /// address does not resolve, or the socket cannot be bound.
    pub async fn connect(config: RconConfig) -> Result<Self, RconError> {
        config.validate().map_err(RconError::Setup)?;

        let peer = tokio::net::lookup_host(config.address.as_str())
            .await?
            .next()
            .ok_or_else(|| RconError::Setup(format!("address {} did not resolve", config.address)))?;
        let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;

        info!("🎮 RCON client ready for {} ({:?})", peer, config.encoding);
        Ok(Self {
            inner: Arc::new(RconInner {
                config,
                peer,
                socket: tokio::sync::Mutex::new(Some(socket)),
                closed: AtomicBool::new(false),
                counters: Counters::default(),
            }),
            worker: Mutex::new(None),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.inner.peer
    }

    pub fn config(&self) -> &RconConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Sends a command with the configured timeout and retry count.
    pub async fn send(&self, command: &str) -> String {
        let config = &self.inner.config;
        self.inner
            .send_with(command, config.timeout(), config.max_retries)
            .await
    }

    /// Sends a command and waits for its reply.
    ///
    /// Attempts stop at whichever comes first: `max_retries + 1` attempts or
    /// the configured wall-clock budget. No-reply commands are attempted once.
    ///
    /// # Returns
    ///
    /// The reply payload, or an empty string if no reply could be obtained.
    pub async fn send_with(&self, command: &str, timeout: Duration, max_retries: u32) -> String {
        self.inner.send_with(command, timeout, max_retries).await
    }

    /// Queues commands for the background worker and returns immediately.
    ///
    /// Commands are sent in order, each with the configured async retry count.
    pub fn send_async(&self, commands: Vec<String>) {
        if commands.is_empty() {
            return;
        }
        if self.is_closed() {
            warn!("⚠️ RCON client closed, dropping {} queued command(s)", commands.len());
            return;
        }

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let worker = worker.get_or_insert_with(|| spawn_worker(self.inner.clone()));
        if worker.queue.send(WorkerMessage::Batch(commands)).is_err() {
            warn!("⚠️ RCON burst worker is gone, commands dropped");
        }
    }

    /// Stops the burst worker and closes the socket.
    ///
    /// The worker finishes the batches queued before the stop sentinel; the
    /// join is bounded by the configured close timeout.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            let _ = worker.queue.send(WorkerMessage::Stop);
            if tokio::time::timeout(self.inner.config.close_timeout(), worker.handle)
                .await
                .is_err()
            {
                warn!("⏰ RCON burst worker did not stop in time");
            }
        }

        drop(self.inner.socket.lock().await.take());
        info!("🔌 RCON client for {} closed", self.inner.peer);
    }

    pub fn stats(&self) -> RconStats {
        let counters = &self.inner.counters;
        RconStats {
            commands: counters.commands.load(Ordering::Relaxed),
            attempts: counters.attempts.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
        }
    }
}

fn spawn_worker(inner: Arc<RconInner>) -> BurstWorker {
    let (queue, mut receiver) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        debug!("RCON burst worker started");
        while let Some(message) = receiver.recv().await {
            match message {
                WorkerMessage::Batch(commands) => {
                    for command in commands {
                        inner
                            .send_with(&command, inner.config.timeout(), inner.config.async_retries)
                            .await;
                    }
                }
                WorkerMessage::Stop => break,
            }
        }
        debug!("RCON burst worker stopped");
    });

    BurstWorker { queue, handle }
}

impl RconInner {
    async fn send_with(&self, command: &str, timeout: Duration, max_retries: u32) -> String {
        self.counters.commands.fetch_add(1, Ordering::Relaxed);

        let guard = self.socket.lock().await;
        let Some(socket) = guard.as_ref() else {
            warn!("⚠️ RCON client closed, not sending '{}'", command);
            return String::new();
        };

        let started = Instant::now();
        let budget = self.config.budget();
        let no_reply = is_no_reply_command(command);
        let packet = encode_request(&self.config.password, command, self.config.encoding);

        let mut attempts = 0u32;
        let mut last_error = RconError::Closed;
        loop {
            let elapsed = started.elapsed();
            if attempts > max_retries || elapsed >= budget {
                break;
            }
            attempts += 1;
            self.counters.attempts.fetch_add(1, Ordering::Relaxed);

            let deadline = deadline_after(timeout.min(budget - elapsed));
            match self.attempt(socket, &packet, deadline).await {
                Ok(reply) => {
                    debug!("RCON '{}' answered on attempt {}", command, attempts);
                    return reply;
                }
                Err(RconError::ReadTimeout) if no_reply => {
                    debug!("RCON '{}' sent, no reply expected", command);
                    return String::new();
                }
                Err(e) => {
                    warn!("⚠️ RCON '{}' attempt {} failed: {}", command, attempts, e);
                    last_error = e;
                    if no_reply {
                        break;
                    }
                }
            }
        }

        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        error!(
            "❌ RCON '{}' gave up after {} attempt(s) in {:?}: {}",
            command,
            attempts,
            started.elapsed(),
            last_error
        );
        String::new()
    }

    /// One request/reply exchange; every step shares the same `deadline`.
    async fn attempt(
        &self,
        socket: &UdpSocket,
        packet: &[u8],
        deadline: Instant,
    ) -> Result<String, RconError> {
        drain_stale(socket);

        timeout_at(deadline, socket.writable())
            .await
            .map_err(|_| RconError::WriteTimeout)??;
        timeout_at(deadline, socket.send(packet))
            .await
            .map_err(|_| RconError::WriteTimeout)??;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let received = timeout_at(deadline, socket.recv(&mut buf))
            .await
            .map_err(|_| RconError::ReadTimeout)??;
        let mut reply = decode_reply(&buf[..received], self.config.encoding).ok_or_else(|| {
            RconError::MalformedReply(format!("{} byte datagram without prefix", received))
        })?;

        // long replies arrive as several datagrams in quick succession
        loop {
            let window = deadline_after(self.config.followup()).min(deadline);
            let Ok(Ok(received)) = timeout_at(window, socket.recv(&mut buf)).await else {
                break;
            };
            match decode_reply(&buf[..received], self.config.encoding) {
                Some(more) => reply.push_str(&more),
                None => break,
            }
        }

        Ok(reply)
    }
}

/// `now + delay`, saturating instead of overflowing for huge delays.
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Discards datagrams left over from earlier timed-out requests.
fn drain_stale(socket: &UdpSocket) {
    let mut scratch = [0u8; 1024];
    let mut dropped = 0;
    while socket.try_recv(&mut scratch).is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!("Discarded {} stale RCON datagram(s)", dropped);
    }
}
