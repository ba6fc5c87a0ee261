//! Chat log plugin.
//!
//! Every chat line is written to the `chatlog` tracing target with a local
//! timestamp. Per-player line counts and the most recent lines are kept in
//! plugin storage under `chatlog:count:<player>` and `chatlog:recent`.

use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, Utc};
use plugin_system::{
    keys, Dispatch, Event, Plugin, PluginConfig, PluginContext, PluginError, PluginFactory,
    PluginRequirements, ADMIN_PLUGIN,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

pub const PLUGIN_NAME: &str = "chatlog";

const RECENT_KEY: &str = "chatlog:recent";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChatLogSettings {
    /// strftime pattern for the logged timestamp
    pub timestamp_format: String,
    /// Number of recent lines mirrored to storage. Zero disables it.
    pub keep_last: usize,
}

impl Default for ChatLogSettings {
    fn default() -> Self {
        Self {
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            keep_last: 50,
        }
    }
}

/// One recorded chat line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub at: DateTime<Utc>,
    pub channel: String,
    pub player: String,
    pub text: String,
}

pub struct ChatLogPlugin {
    settings: ChatLogSettings,
    started_at: DateTime<Utc>,
    lines: AtomicU64,
    recent: Mutex<VecDeque<ChatLine>>,
}

impl ChatLogPlugin {
    pub fn new() -> Self {
        Self {
            settings: ChatLogSettings::default(),
            started_at: Utc::now(),
            lines: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn lines_recorded(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    fn channel(key: Option<&str>) -> Option<&'static str> {
        match key? {
            keys::EVT_CLIENT_SAY => Some("all"),
            keys::EVT_CLIENT_TEAM_SAY => Some("team"),
            keys::EVT_CLIENT_PRIVATE_SAY => Some("private"),
            _ => None,
        }
    }

    /// Remembers `line` and returns the recent lines to persist.
    fn remember(&self, line: ChatLine) -> Vec<ChatLine> {
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.push_back(line);
        while recent.len() > self.settings.keep_last {
            recent.pop_front();
        }
        recent.iter().cloned().collect()
    }

    async fn record(&self, line: ChatLine, context: &PluginContext) -> Result<(), PluginError> {
        let stamp = line.at.with_timezone(&Local).format(&self.settings.timestamp_format);
        info!(target: "chatlog", "💬 [{}] [{}] {}: {}", stamp, line.channel, line.player, line.text);
        self.lines.fetch_add(1, Ordering::Relaxed);

        let storage = context.storage();
        let count_key = format!("chatlog:count:{}", line.player);
        let count = storage
            .get(&count_key)
            .await?
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        storage.put(&count_key, json!(count + 1)).await?;

        if self.settings.keep_last > 0 {
            let recent = self.remember(line);
            let value = serde_json::to_value(recent).map_err(|e| PluginError::Storage(e.to_string()))?;
            storage.put(RECENT_KEY, value).await?;
        }
        Ok(())
    }
}

impl Default for ChatLogPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for ChatLogPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn subscriptions(&self) -> Vec<String> {
        [keys::EVT_CLIENT_SAY, keys::EVT_CLIENT_TEAM_SAY, keys::EVT_CLIENT_PRIVATE_SAY]
            .iter()
            .map(|k| k.to_string())
            .collect()
    }

    fn on_load_config(&mut self, config: &PluginConfig) -> Result<(), PluginError> {
        let settings: ChatLogSettings = config.parse()?;
        if StrftimeItems::new(&settings.timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(PluginError::Config(format!(
                "invalid timestamp_format '{}'",
                settings.timestamp_format
            )));
        }
        self.settings = settings;
        Ok(())
    }

    async fn on_startup(&self, _context: Arc<PluginContext>) -> Result<(), PluginError> {
        debug!("💬 Chat log started at {}", self.started_at);
        Ok(())
    }

    async fn on_event(&self, event: &Event, context: &PluginContext) -> Result<Dispatch, PluginError> {
        let key = context.bus().catalog().key(event.type_id());
        if key.as_deref() == Some(keys::EVT_EXIT) {
            let uptime = Utc::now() - self.started_at;
            info!(
                "💬 Chat log closing: {} line(s) recorded over {} minute(s)",
                self.lines_recorded(),
                uptime.num_minutes()
            );
            return Ok(Dispatch::Continue);
        }

        let Some(channel) = Self::channel(key.as_deref()) else {
            return Ok(Dispatch::Continue);
        };
        let Some(text) = event.data_str("text") else {
            return Ok(Dispatch::Continue);
        };
        let player = event
            .client()
            .map(|c| c.guid.clone().unwrap_or_else(|| c.display_name().to_string()))
            .unwrap_or_else(|| "<console>".to_string());

        self.record(
            ChatLine {
                at: Utc::now(),
                channel: channel.to_string(),
                player,
                text: text.to_string(),
            },
            context,
        )
        .await?;
        Ok(Dispatch::Continue)
    }
}

#[derive(Debug, Default)]
pub struct ChatLogFactory;

impl PluginFactory for ChatLogFactory {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn requirements(&self) -> PluginRequirements {
        PluginRequirements::new()
            .min_version("1.0")
            .load_after(&[ADMIN_PLUGIN])
    }

    fn create(&self) -> Box<dyn Plugin> {
        Box::new(ChatLogPlugin::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_system::{IdentityRef, MemoryStorage};
    use warden_event_system::{EventBus, EventBusConfig, EventCatalog, TaskScheduler};
    use warden_rcon::{RconClient, RconConfig};

    async fn context() -> PluginContext {
        let bus = Arc::new(EventBus::new(
            Arc::new(EventCatalog::standard()),
            EventBusConfig::default(),
        ));
        let rcon = RconClient::connect(RconConfig::new("127.0.0.1:27960", "secret"))
            .await
            .unwrap();
        PluginContext::new(
            bus,
            Arc::new(rcon),
            Arc::new(MemoryStorage::new()),
            Arc::new(TaskScheduler::start()),
            "q3a",
        )
    }

    fn chat(context: &PluginContext, key: &str, name: &str, text: &str) -> Event {
        let id = context.bus().event_id(key).unwrap();
        Event::new(id, json!({ "text": text })).with_client(IdentityRef::new("1").with_name(name))
    }

    fn configured(toml: &str) -> ChatLogPlugin {
        let mut plugin = ChatLogPlugin::new();
        plugin
            .on_load_config(&PluginConfig::from_toml(toml, None).unwrap())
            .unwrap();
        plugin
    }

    #[tokio::test]
    async fn test_counts_lines_per_player() {
        let ctx = context().await;
        let plugin = configured("");

        for text in ["hi", "gg"] {
            plugin
                .on_event(&chat(&ctx, keys::EVT_CLIENT_SAY, "Sarge", text), &ctx)
                .await
                .unwrap();
        }
        plugin
            .on_event(&chat(&ctx, keys::EVT_CLIENT_TEAM_SAY, "Klesk", "rush"), &ctx)
            .await
            .unwrap();

        assert_eq!(plugin.lines_recorded(), 3);
        let storage = ctx.storage();
        assert_eq!(storage.get("chatlog:count:Sarge").await.unwrap(), Some(json!(2)));
        assert_eq!(storage.get("chatlog:count:Klesk").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_recent_lines_are_bounded() {
        let ctx = context().await;
        let plugin = configured("keep_last = 2");

        for text in ["one", "two", "three"] {
            plugin
                .on_event(&chat(&ctx, keys::EVT_CLIENT_SAY, "Sarge", text), &ctx)
                .await
                .unwrap();
        }

        let stored = ctx.storage().get(RECENT_KEY).await.unwrap().unwrap();
        let recent: Vec<ChatLine> = serde_json::from_value(stored).unwrap();
        let texts: Vec<&str> = recent.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);
        assert_eq!(recent[0].channel, "all");
    }

    #[tokio::test]
    async fn test_ignores_other_events() {
        let ctx = context().await;
        let plugin = configured("");
        let id = ctx.bus().event_id(keys::EVT_CLIENT_KILL).unwrap();

        let outcome = plugin.on_event(&Event::signal(id), &ctx).await.unwrap();
        assert_eq!(outcome, Dispatch::Continue);

        let exit = Event::signal(ctx.bus().exit_event_id());
        assert_eq!(plugin.on_event(&exit, &ctx).await.unwrap(), Dispatch::Continue);
        assert_eq!(plugin.lines_recorded(), 0);
    }

    #[test]
    fn test_rejects_bad_timestamp_format() {
        let mut plugin = ChatLogPlugin::new();
        let config = PluginConfig::from_toml("timestamp_format = \"%Q\"", None).unwrap();
        assert!(matches!(plugin.on_load_config(&config), Err(PluginError::Config(_))));
    }

    #[test]
    fn test_factory_requirements() {
        let requirements = ChatLogFactory.requirements();
        assert_eq!(requirements.load_after_plugins, vec![ADMIN_PLUGIN.to_string()]);
        assert!(!requirements.requires_config_file);
    }
}
