//! The read pipeline: log reader, decoder and translator feeding the bus.
//!
//! The pipeline owns every parser-side object and runs on its own OS thread,
//! reaching the async event bus through a runtime [`Handle`]. The only state
//! it shares with the dispatcher is the bounded event queue.

use crate::config::ServerSettings;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use warden_event_system::{EventBus, ShutdownState};
use warden_parser::{EventTranslator, LineDecoder, LogReader, ParserError};

/// Name of the reader thread, visible in thread-aware log output.
pub const READER_THREAD: &str = "warden-reader";

/// Timing knobs for [`ReadPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Delay between reads when the log has nothing new
    pub poll_interval: Duration,
    /// Consecutive failed publishes before the reader backs off
    pub overload_threshold: u32,
    /// How long the reader stays paused after an overload
    pub overload_pause: Duration,
}

impl From<&ServerSettings> for PipelineSettings {
    fn from(server: &ServerSettings) -> Self {
        Self {
            poll_interval: server.poll_interval(),
            overload_threshold: server.overload_threshold.max(1),
            overload_pause: server.overload_pause(),
        }
    }
}

/// Counters reported when the reader stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Complete lines read from the log
    pub lines: u64,
    /// Lines that produced an event
    pub events: u64,
    /// Events accepted by the bus
    pub published: u64,
    /// Events the bus refused
    pub rejected: u64,
    /// Times the reader backed off because the queue stayed full
    pub overloads: u64,
}

pub struct ReadPipeline {
    reader: LogReader,
    decoder: LineDecoder,
    translator: EventTranslator,
    bus: Arc<EventBus>,
    settings: PipelineSettings,
    stats: PipelineStats,
    consecutive_rejections: u32,
}

impl ReadPipeline {
    pub fn new(
        reader: LogReader,
        decoder: LineDecoder,
        translator: EventTranslator,
        bus: Arc<EventBus>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            reader,
            decoder,
            translator,
            bus,
            settings,
            stats: PipelineStats::default(),
            consecutive_rejections: 0,
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Reads whatever the log gained since the last call and publishes it.
    ///
    /// When the bus rejects `overload_threshold` events in a row the reader is
    /// paused for the cool-down and then resumed at the end of the file, so
    /// the backlog written meanwhile is skipped.
    ///
    /// # Returns
    ///
    /// The number of lines read.
    pub async fn pump(&mut self) -> Result<usize, ParserError> {
        let lines = self.reader.read()?;
        let count = lines.len();
        self.stats.lines += count as u64;

        for line in lines {
            let Some(action) = self.decoder.decode(&line) else {
                continue;
            };
            let Some(event) = self.translator.translate(&action) else {
                continue;
            };
            self.stats.events += 1;

            if self.bus.publish_default(event).await {
                self.stats.published += 1;
                self.consecutive_rejections = 0;
                continue;
            }

            self.stats.rejected += 1;
            self.consecutive_rejections += 1;
            if self.consecutive_rejections >= self.settings.overload_threshold {
                self.back_off().await?;
                break;
            }
        }
        Ok(count)
    }

    async fn back_off(&mut self) -> Result<(), ParserError> {
        self.stats.overloads += 1;
        warn!(
            "🔥 Event queue saturated ({} events rejected in a row), pausing log reader for {:?}",
            self.consecutive_rejections, self.settings.overload_pause
        );
        self.reader.pause();
        tokio::time::sleep(self.settings.overload_pause).await;
        self.consecutive_rejections = 0;
        self.reader.unpause()
    }

    /// Pumps until shutdown is initiated.
    pub async fn run(mut self, shutdown: ShutdownState) -> PipelineStats {
        info!("📜 Reading {}", self.reader.path().display());
        while !shutdown.is_shutdown_initiated() {
            let idle = match self.pump().await {
                Ok(count) => count == 0,
                Err(e) => {
                    error!("❌ Failed to read {}: {}", self.reader.path().display(), e);
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                }
            }
        }

        debug!("Reader stopped at byte {}", self.reader.position());
        info!(
            "📜 Log reader stopped: {} lines, {} events, {} published, {} rejected",
            self.stats.lines, self.stats.events, self.stats.published, self.stats.rejected
        );
        self.stats
    }

    /// Runs the pipeline on a dedicated OS thread driven by `handle`.
    pub fn spawn(
        self,
        handle: Handle,
        shutdown: ShutdownState,
    ) -> std::io::Result<JoinHandle<PipelineStats>> {
        std::thread::Builder::new()
            .name(READER_THREAD.to_string())
            .spawn(move || handle.block_on(self.run(shutdown)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use warden_event_system::{handler_fn, keys, Dispatch, EventBusConfig, EventCatalog};

    fn settings() -> PipelineSettings {
        PipelineSettings {
            poll_interval: Duration::from_millis(10),
            overload_threshold: 2,
            overload_pause: Duration::from_millis(10),
        }
    }

    fn pipeline(file: &NamedTempFile, bus: Arc<EventBus>) -> ReadPipeline {
        let (grammar, translator) =
            warden_parser::games::load("q3a", bus.catalog().clone()).unwrap();
        let reader = LogReader::open(file.path(), true).unwrap();
        ReadPipeline::new(reader, LineDecoder::new(grammar), translator, bus, settings())
    }

    #[tokio::test]
    async fn test_lines_reach_handlers_in_order() {
        let catalog = Arc::new(EventCatalog::standard());
        let bus = Arc::new(EventBus::new(catalog, EventBusConfig::default()));
        let said = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = said.clone();
        bus.register_handler_for_key(
            keys::EVT_CLIENT_SAY,
            handler_fn("recorder", move |event| {
                sink.lock()
                    .unwrap()
                    .push(event.data_str("text").unwrap_or_default().to_string());
                Ok(Dispatch::Continue)
            }),
        );
        let dispatcher = tokio::spawn(bus.clone().run());

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  0:00 ClientConnect: 2").unwrap();
        writeln!(file, "  0:01 say: 2 Bob: hello").unwrap();
        writeln!(file, "  0:02 say: 2 Bob: world").unwrap();
        file.flush().unwrap();

        let mut pipeline = pipeline(&file, bus.clone());
        assert_eq!(pipeline.pump().await.unwrap(), 3);
        assert_eq!(pipeline.stats().published, 3);

        bus.request_stop().await;
        dispatcher.await.unwrap().unwrap();
        assert_eq!(*said.lock().unwrap(), vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn test_saturated_queue_pauses_and_skips_backlog() {
        let catalog = Arc::new(EventCatalog::standard());
        let config = EventBusConfig {
            queue_capacity: 1,
            publish_timeout: Duration::ZERO,
            ..EventBusConfig::default()
        };
        // No dispatcher: the queue fills after one event.
        let bus = Arc::new(EventBus::new(catalog, config));

        let mut file = NamedTempFile::new().unwrap();
        for n in 0..5 {
            writeln!(file, "  0:0{n} say: 2 Bob: line {n}").unwrap();
        }
        file.flush().unwrap();

        let mut pipeline = pipeline(&file, bus.clone());
        pipeline.pump().await.unwrap();
        let stats = pipeline.stats();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.overloads, 1);

        writeln!(file, "  0:09 say: 2 Bob: after pause").unwrap();
        file.flush().unwrap();
        assert_eq!(pipeline.pump().await.unwrap(), 1);
        assert_eq!(bus.stats().queue_full, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reader_thread_stops_on_shutdown() {
        let catalog = Arc::new(EventCatalog::standard());
        let bus = Arc::new(EventBus::new(catalog, EventBusConfig::default()));
        let file = NamedTempFile::new().unwrap();
        let shutdown = ShutdownState::new();

        let thread = pipeline(&file, bus)
            .spawn(Handle::current(), shutdown.clone())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.initiate_shutdown();

        let stats = tokio::task::spawn_blocking(move || thread.join())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats, PipelineStats::default());
    }
}
