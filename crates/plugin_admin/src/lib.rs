//! The mandatory `admin` plugin.
//!
//! Watches chat for lines starting with the command prefix (`!` by default)
//! and runs the matching command, usually by sending RCON commands to the
//! server. With `hide_commands` set, command lines are vetoed so plugins
//! loaded after this one never see them.
//!
//! ```toml
//! command_prefix = "!"
//! hide_commands = true
//! admins = ["3F2504E04F8911D39A0C0305E82C3301"]
//! announce = "^2Warden online"
//! ```

use async_trait::async_trait;
use lazy_static::lazy_static;
use plugin_system::{
    keys, Dispatch, Event, IdentityRef, Plugin, PluginConfig, PluginContext, PluginError,
    PluginFactory, ADMIN_PLUGIN,
};
use regex::Regex;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings read from the plugin's config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    pub command_prefix: String,
    pub hide_commands: bool,
    /// GUIDs allowed to run privileged commands. Player names are not
    /// accepted here since players pick their own.
    pub admins: Vec<String>,
    /// Broadcast once at startup, if set.
    pub announce: Option<String>,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            command_prefix: "!".to_string(),
            hide_commands: true,
            admins: Vec::new(),
            announce: None,
        }
    }
}

lazy_static! {
    static ref MAP_NAME: Regex = Regex::new(r"^[A-Za-z0-9_\-]+$").expect("map name pattern is valid");
}

/// Who may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Anyone,
    Admin,
}

struct Command {
    name: &'static str,
    level: Level,
    usage: &'static str,
    run: fn(&AdminPlugin, &IdentityRef, &str) -> Vec<String>,
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        level: Level::Anyone,
        usage: "help - list commands",
        run: AdminPlugin::cmd_help,
    },
    Command {
        name: "say",
        level: Level::Admin,
        usage: "say <text> - broadcast a message",
        run: AdminPlugin::cmd_say,
    },
    Command {
        name: "kick",
        level: Level::Admin,
        usage: "kick <slot|name> - remove a player",
        run: AdminPlugin::cmd_kick,
    },
    Command {
        name: "map",
        level: Level::Admin,
        usage: "map <name> - change map",
        run: AdminPlugin::cmd_map,
    },
];

/// Chat command handler.
#[derive(Debug, Default)]
pub struct AdminPlugin {
    settings: AdminSettings,
    commands_run: AtomicU64,
}

impl AdminPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&self) -> &AdminSettings {
        &self.settings
    }

    pub fn commands_run(&self) -> u64 {
        self.commands_run.load(Ordering::Relaxed)
    }

    fn is_admin(&self, client: &IdentityRef) -> bool {
        let Some(guid) = client.guid.as_deref().filter(|g| !g.is_empty()) else {
            return false;
        };
        self.settings.admins.iter().any(|admin| admin == guid)
    }

    /// Splits `text` into command name and argument string if it is a command.
    fn parse<'a>(&self, text: &'a str) -> Option<(String, &'a str)> {
        let body = text.trim().strip_prefix(self.settings.command_prefix.as_str())?;
        let mut parts = body.splitn(2, char::is_whitespace);
        let name = parts.next().filter(|n| !n.is_empty())?.to_ascii_lowercase();
        Some((name, parts.next().unwrap_or_default().trim()))
    }

    /// RCON commands answering `client` and the outcome to log.
    fn execute(&self, client: &IdentityRef, name: &str, args: &str) -> Vec<String> {
        let Some(command) = COMMANDS.iter().find(|c| c.name == name) else {
            return vec![tell(client, &format!("Unknown command {}{}", self.settings.command_prefix, name))];
        };
        if command.level == Level::Admin && !self.is_admin(client) {
            warn!(
                "🛡️ {} tried {}{} without permission",
                client.display_name(),
                self.settings.command_prefix,
                name
            );
            return vec![tell(client, "You do not have permission to use that command")];
        }
        self.commands_run.fetch_add(1, Ordering::Relaxed);
        info!("🛡️ {} ran {}{} {}", client.display_name(), self.settings.command_prefix, name, args);
        (command.run)(self, client, args)
    }

    fn cmd_help(&self, client: &IdentityRef, _args: &str) -> Vec<String> {
        let admin = self.is_admin(client);
        COMMANDS
            .iter()
            .filter(|c| admin || c.level == Level::Anyone)
            .map(|c| tell(client, &format!("{}{}", self.settings.command_prefix, c.usage)))
            .collect()
    }

    fn cmd_say(&self, client: &IdentityRef, args: &str) -> Vec<String> {
        if args.is_empty() {
            return vec![tell(client, "Usage: say <text>")];
        }
        vec![format!("say \"{}\"", quote(args))]
    }

    fn cmd_kick(&self, client: &IdentityRef, args: &str) -> Vec<String> {
        match args.split_whitespace().next() {
            None => vec![tell(client, "Usage: kick <slot|name>")],
            Some(slot) if slot.chars().all(|c| c.is_ascii_digit()) => {
                vec![format!("clientkick {}", slot)]
            }
            Some(name) => vec![format!("kick \"{}\"", quote(name))],
        }
    }

    fn cmd_map(&self, client: &IdentityRef, args: &str) -> Vec<String> {
        match args.split_whitespace().next() {
            Some(map) if MAP_NAME.is_match(map) => vec![format!("map {}", map)],
            Some(map) => {
                warn!("🛡️ {} asked for invalid map name {:?}", client.display_name(), map);
                vec![tell(client, "Map names may only contain letters, digits, '_' and '-'")]
            }
            None => vec![tell(client, "Usage: map <name>")],
        }
    }
}

fn quote(text: &str) -> String {
    text.replace('"', "'")
}

/// Private reply; falls back to a broadcast when the slot is unknown.
fn tell(client: &IdentityRef, text: &str) -> String {
    if client.cid.is_empty() {
        format!("say \"{}\"", quote(text))
    } else {
        format!("tell {} \"{}\"", client.cid, quote(text))
    }
}

#[async_trait]
impl Plugin for AdminPlugin {
    fn name(&self) -> &str {
        ADMIN_PLUGIN
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
        let settings: AdminSettings = config.parse()?;
        if settings.command_prefix.trim().is_empty() {
            return Err(PluginError::Config("command_prefix cannot be empty".to_string()));
        }
        debug!("🛡️ Admin settings: {:?}", settings);
        self.settings = settings;
        Ok(())
    }

    async fn on_startup(&self, context: Arc<PluginContext>) -> Result<(), PluginError> {
        info!(
            "🛡️ Admin plugin ready: prefix '{}', {} admin(s)",
            self.settings.command_prefix,
            self.settings.admins.len()
        );
        if let Some(message) = &self.settings.announce {
            context.rcon().send_async(vec![format!("say \"{}\"", quote(message))]);
        }
        Ok(())
    }

    async fn on_event(&self, event: &Event, context: &PluginContext) -> Result<Dispatch, PluginError> {
        let (Some(text), Some(client)) = (event.data_str("text"), event.client()) else {
            return Ok(Dispatch::Continue);
        };
        let Some((name, args)) = self.parse(text) else {
            return Ok(Dispatch::Continue);
        };

        let commands = self.execute(client, &name, args);
        if !commands.is_empty() {
            context.rcon().send_async(commands);
        }

        Ok(if self.settings.hide_commands {
            Dispatch::Veto
        } else {
            Dispatch::Continue
        })
    }
}

/// Factory registered under the name `admin`.
#[derive(Debug, Default)]
pub struct AdminFactory;

impl PluginFactory for AdminFactory {
    fn name(&self) -> &str {
        ADMIN_PLUGIN
    }

    fn create(&self) -> Box<dyn Plugin> {
        Box::new(AdminPlugin::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_system::MemoryStorage;
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use warden_event_system::{EventBus, EventBusConfig, EventCatalog, TaskScheduler};
    use warden_rcon::{RconClient, RconConfig};

    struct Fixture {
        server: UdpSocket,
        context: PluginContext,
        catalog: Arc<EventCatalog>,
    }

    impl Fixture {
        async fn new() -> Self {
            let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let address = server.local_addr().unwrap().to_string();
            let catalog = Arc::new(EventCatalog::standard());
            let bus = Arc::new(EventBus::new(catalog.clone(), EventBusConfig::default()));
            let mut config = RconConfig::new(address, "secret");
            config.timeout_ms = 50;
            config.budget_ms = 100;
            let rcon = RconClient::connect(config).await.unwrap();
            let context = PluginContext::new(
                bus,
                Arc::new(rcon),
                Arc::new(MemoryStorage::new()),
                Arc::new(TaskScheduler::start()),
                "q3a",
            );
            Self {
                server,
                context,
                catalog,
            }
        }

        fn say(&self, client: IdentityRef, text: &str) -> Event {
            let id = self.catalog.id(keys::EVT_CLIENT_SAY).unwrap();
            Event::new(id, json!({ "text": text })).with_client(client)
        }

        /// Next command the fake server received, without the RCON framing.
        async fn received(&self) -> String {
            let mut buf = [0u8; 2048];
            let (n, _) = tokio::time::timeout(Duration::from_secs(2), self.server.recv_from(&mut buf))
                .await
                .expect("no RCON datagram")
                .unwrap();
            let text = String::from_utf8_lossy(&buf[4..n]).to_string();
            text.trim_start_matches("rcon \"secret\" ").trim_end().to_string()
        }
    }

    fn plugin(toml: &str) -> AdminPlugin {
        let mut plugin = AdminPlugin::new();
        let config = PluginConfig::from_toml(toml, None).unwrap();
        plugin.on_load_config(&config).unwrap();
        plugin
    }

    fn sarge() -> IdentityRef {
        IdentityRef::new("2").with_name("Sarge").with_guid("GUID-SARGE")
    }

    #[test]
    fn test_default_settings() {
        let plugin = plugin("");
        assert_eq!(plugin.settings(), &AdminSettings::default());
    }

    #[test]
    fn test_empty_prefix_is_rejected() {
        let mut plugin = AdminPlugin::new();
        let config = PluginConfig::from_toml("command_prefix = \" \"", None).unwrap();
        assert!(plugin.on_load_config(&config).is_err());
    }

    #[test]
    fn test_parse_commands() {
        let plugin = plugin("command_prefix = \"#\"");
        assert_eq!(plugin.parse("#KICK 3 spam"), Some(("kick".to_string(), "3 spam")));
        assert_eq!(plugin.parse("#help"), Some(("help".to_string(), "")));
        assert_eq!(plugin.parse("hello #help"), None);
        assert_eq!(plugin.parse("#"), None);
    }

    #[test]
    fn test_kick_by_slot_or_name() {
        let plugin = plugin("admins = [\"GUID-SARGE\"]");
        assert_eq!(plugin.execute(&sarge(), "kick", "4"), vec!["clientkick 4"]);
        assert_eq!(plugin.execute(&sarge(), "kick", "Kle\"sk"), vec!["kick \"Kle'sk\""]);
        assert_eq!(plugin.commands_run(), 2);
    }

    #[test]
    fn test_help_lists_only_permitted_commands() {
        let guest = plugin("");
        let replies = guest.execute(&sarge(), "help", "");
        assert_eq!(replies, vec!["tell 2 \"!help - list commands\""]);

        let admin = plugin("admins = [\"GUID-SARGE\"]");
        assert_eq!(admin.execute(&sarge(), "help", "").len(), COMMANDS.len());
    }

    #[test]
    fn test_admin_rights_follow_guid_not_name() {
        let admin = plugin("admins = [\"GUID-SARGE\", \"Sarge\"]");
        let impostor = IdentityRef::new("7").with_name("Sarge").with_guid("GUID-OTHER");
        assert_eq!(
            admin.execute(&impostor, "map", "q3dm17"),
            vec!["tell 7 \"You do not have permission to use that command\""]
        );

        let no_guid = IdentityRef::new("8").with_name("Sarge");
        assert_eq!(admin.execute(&no_guid, "help", "").len(), 1);
        assert_eq!(admin.commands_run(), 1);
    }

    #[test]
    fn test_map_name_cannot_chain_commands() {
        let admin = plugin("admins = [\"GUID-SARGE\"]");
        assert_eq!(admin.execute(&sarge(), "map", "q3dm17"), vec!["map q3dm17"]);
        assert_eq!(admin.execute(&sarge(), "map", "ut4_turnpike-v2"), vec!["map ut4_turnpike-v2"]);

        for hostile in ["q3dm17;rcon_password;quit", "\"q3dm17\"", "$sv_hostname"] {
            let replies = admin.execute(&sarge(), "map", hostile);
            assert_eq!(replies.len(), 1);
            assert!(replies[0].starts_with("tell 2 "), "{hostile:?} produced {replies:?}");
        }
    }

    #[tokio::test]
    async fn test_admin_command_goes_to_rcon_and_is_vetoed() {
        let fx = Fixture::new().await;
        let plugin = plugin("admins = [\"GUID-SARGE\"]");

        let outcome = plugin
            .on_event(&fx.say(sarge(), "!say hello world"), &fx.context)
            .await
            .unwrap();

        assert_eq!(outcome, Dispatch::Veto);
        assert_eq!(fx.received().await, "say \"hello world\"");
    }

    #[tokio::test]
    async fn test_unprivileged_user_is_told_off() {
        let fx = Fixture::new().await;
        let plugin = plugin("hide_commands = false");

        let outcome = plugin
            .on_event(&fx.say(sarge(), "!map q3dm17"), &fx.context)
            .await
            .unwrap();

        assert_eq!(outcome, Dispatch::Continue);
        assert_eq!(
            fx.received().await,
            "tell 2 \"You do not have permission to use that command\""
        );
        assert_eq!(plugin.commands_run(), 0);
    }

    #[tokio::test]
    async fn test_plain_chat_passes_through() {
        let fx = Fixture::new().await;
        let plugin = plugin("");
        let outcome = plugin
            .on_event(&fx.say(sarge(), "gg all"), &fx.context)
            .await
            .unwrap();
        assert_eq!(outcome, Dispatch::Continue);
    }

    #[test]
    fn test_factory() {
        let factory = AdminFactory;
        assert_eq!(factory.name(), "admin");
        assert_eq!(factory.create().name(), "admin");
    }
}
