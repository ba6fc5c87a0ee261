use super::*;
use crate::error::PluginError;
use crate::plugin::Plugin;
use crate::storage::MemoryStorage;
use async_trait::async_trait;
use std::sync::Mutex;
use warden_event_system::{keys, Dispatch, Event, EventBus, EventBusConfig, EventCatalog, TaskScheduler};
use warden_rcon::{RconClient, RconConfig};

type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Default)]
struct Behaviour {
    fail_config: bool,
    fail_startup: bool,
}

struct Probe {
    name: String,
    journal: Journal,
    behaviour: Behaviour,
    greeting: String,
}

#[async_trait]
impl Plugin for Probe {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![keys::EVT_CLIENT_SAY.to_string()]
    }

    fn on_load_config(&mut self, config: &PluginConfig) -> Result<(), PluginError> {
        if self.behaviour.fail_config {
            return Err(PluginError::Config("bad settings".to_string()));
        }
        if let Some(greeting) = config.get("greeting").and_then(|v| v.as_str()) {
            self.greeting = greeting.to_string();
        }
        Ok(())
    }

    async fn on_startup(&self, _context: Arc<PluginContext>) -> Result<(), PluginError> {
        if self.behaviour.fail_startup {
            return Err(PluginError::InitializationFailed("no".to_string()));
        }
        self.journal.lock().unwrap().push(format!("start:{}", self.name));
        Ok(())
    }

    async fn on_event(&self, _event: &Event, _context: &PluginContext) -> Result<Dispatch, PluginError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("event:{}:{}", self.name, self.greeting));
        Ok(Dispatch::Continue)
    }
}

struct ProbeFactory {
    name: String,
    requirements: PluginRequirements,
    journal: Journal,
    behaviour: Behaviour,
}

impl PluginFactory for ProbeFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> PluginRequirements {
        self.requirements.clone()
    }

    fn create(&self) -> Box<dyn Plugin> {
        Box::new(Probe {
            name: self.name.clone(),
            journal: self.journal.clone(),
            behaviour: self.behaviour.clone(),
            greeting: "hi".to_string(),
        })
    }
}

struct Fixture {
    registry: Arc<PluginRegistry>,
    journal: Journal,
    context: Arc<PluginContext>,
}

impl Fixture {
    async fn new() -> Self {
        Self::for_game("q3a").await
    }

    async fn for_game(game: &str) -> Self {
        let bus = Arc::new(EventBus::new(
            Arc::new(EventCatalog::standard()),
            EventBusConfig::default(),
        ));
        let rcon = RconClient::connect(RconConfig::new("127.0.0.1:27960", "secret"))
            .await
            .unwrap();
        let context = Arc::new(PluginContext::new(
            bus,
            Arc::new(rcon),
            Arc::new(MemoryStorage::new()),
            Arc::new(TaskScheduler::start()),
            game,
        ));
        let fixture = Self {
            registry: Arc::new(PluginRegistry::new()),
            journal: Arc::new(Mutex::new(Vec::new())),
            context,
        };
        fixture.add(ADMIN_PLUGIN, PluginRequirements::new());
        fixture
    }

    fn add(&self, name: &str, requirements: PluginRequirements) {
        self.add_with(name, requirements, Behaviour::default());
    }

    fn add_with(&self, name: &str, requirements: PluginRequirements, behaviour: Behaviour) {
        self.registry.register(Arc::new(ProbeFactory {
            name: name.to_string(),
            requirements,
            journal: self.journal.clone(),
            behaviour,
        }));
    }

    fn scheduler(&self) -> PluginScheduler {
        PluginScheduler::new(self.registry.clone(), self.context.clone())
    }

    fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

fn entries(names: &[&str]) -> Vec<PluginEntry> {
    names.iter().map(|n| PluginEntry::new(n)).collect()
}

fn names(instances: &[Arc<PluginInstance>]) -> Vec<String> {
    instances.iter().map(|p| p.name().to_string()).collect()
}

#[tokio::test]
async fn test_hard_dependency_loads_first() {
    let fx = Fixture::new().await;
    fx.add("stats", PluginRequirements::new().requires(&["xlr"]));
    fx.add("xlr", PluginRequirements::new());

    let loaded = fx
        .scheduler()
        .load_all(&entries(&["stats", "admin", "xlr"]))
        .await
        .unwrap();

    assert_eq!(names(&loaded), vec!["admin", "xlr", "stats"]);
    assert_eq!(fx.journal(), vec!["start:admin", "start:xlr", "start:stats"]);
}

#[tokio::test]
async fn test_missing_hard_dependency_excludes_plugin() {
    let fx = Fixture::new().await;
    fx.add("stats", PluginRequirements::new().requires(&["ghost"]));
    fx.add("spree", PluginRequirements::new());

    let loaded = fx
        .scheduler()
        .load_all(&entries(&["admin", "stats", "spree"]))
        .await
        .unwrap();

    assert_eq!(names(&loaded), vec!["admin", "spree"]);
}

#[tokio::test]
async fn test_soft_dependency_orders_without_requiring() {
    let fx = Fixture::new().await;
    fx.add("welcome", PluginRequirements::new().load_after(&["geo", "ghost"]));
    fx.add("geo", PluginRequirements::new());

    let scheduler = fx.scheduler();
    let loaded = scheduler
        .load_all(&entries(&["admin", "welcome", "geo"]))
        .await
        .unwrap();
    assert_eq!(names(&loaded), vec!["admin", "geo", "welcome"]);

    let fx = Fixture::new().await;
    fx.add("welcome", PluginRequirements::new().load_after(&["geo"]));
    let loaded = fx
        .scheduler()
        .load_all(&entries(&["admin", "welcome"]))
        .await
        .unwrap();
    assert_eq!(names(&loaded), vec!["admin", "welcome"]);
}

#[tokio::test]
async fn test_unconfigured_requirement_is_auto_loaded() {
    let fx = Fixture::new().await;
    fx.add("stats", PluginRequirements::new().requires(&["xlr"]));
    fx.add("xlr", PluginRequirements::new().requires(&["db"]));
    fx.add("db", PluginRequirements::new());

    let loaded = fx
        .scheduler()
        .load_all(&entries(&["admin", "stats"]))
        .await
        .unwrap();
    assert_eq!(names(&loaded), vec!["admin", "db", "xlr", "stats"]);
}

#[tokio::test]
async fn test_cycle_members_and_dependents_are_excluded() {
    let fx = Fixture::new().await;
    fx.add("a", PluginRequirements::new().requires(&["b"]));
    fx.add("b", PluginRequirements::new().load_after(&["a"]));
    fx.add("c", PluginRequirements::new().requires(&["a"]));
    fx.add("d", PluginRequirements::new());

    let loaded = fx
        .scheduler()
        .load_all(&entries(&["admin", "a", "b", "c", "d"]))
        .await
        .unwrap();
    assert_eq!(names(&loaded), vec!["admin", "d"]);
}

#[tokio::test]
async fn test_edges_to_admin_are_satisfied() {
    let fx = Fixture::new().await;
    fx.add("censor", PluginRequirements::new().requires(&["admin"]));

    let loaded = fx
        .scheduler()
        .load_all(&entries(&["censor", "admin"]))
        .await
        .unwrap();
    assert_eq!(names(&loaded), vec!["admin", "censor"]);
}

#[tokio::test]
async fn test_version_game_and_storage_checks() {
    let fx = Fixture::new().await;
    fx.add("future", PluginRequirements::new().min_version("99.0"));
    fx.add("current", PluginRequirements::new().min_version("1.0"));
    fx.add("garbled", PluginRequirements::new().min_version("1.x"));
    fx.add("urt_only", PluginRequirements::new().parsers(&["urt"]));
    fx.add("quake", PluginRequirements::new().parsers(&["Q3A"]));
    fx.add("mysql_only", PluginRequirements::new().storage(&["mysql"]));
    fx.add("memory_ok", PluginRequirements::new().storage(&["memory", "mysql"]));

    let loaded = fx
        .scheduler()
        .load_all(&entries(&[
            "admin",
            "future",
            "current",
            "garbled",
            "urt_only",
            "quake",
            "mysql_only",
            "memory_ok",
        ]))
        .await
        .unwrap();
    assert_eq!(names(&loaded), vec!["admin", "current", "quake", "memory_ok"]);
}

#[tokio::test]
async fn test_missing_admin_is_fatal() {
    let fx = Fixture::new().await;
    let registry = Arc::new(PluginRegistry::new());
    registry.register(Arc::new(ProbeFactory {
        name: "spree".to_string(),
        requirements: PluginRequirements::new(),
        journal: fx.journal.clone(),
        behaviour: Behaviour::default(),
    }));
    let scheduler = PluginScheduler::new(registry, fx.context.clone());

    let result = scheduler.load_all(&entries(&["spree"])).await;
    assert!(matches!(result, Err(PluginSystemError::MandatoryPluginMissing(name)) if name == "admin"));
}

#[tokio::test]
async fn test_admin_is_added_when_not_configured() {
    let fx = Fixture::new().await;
    fx.add("spree", PluginRequirements::new());
    let loaded = fx.scheduler().load_all(&entries(&["spree"])).await.unwrap();
    assert_eq!(names(&loaded), vec!["admin", "spree"]);
}

#[tokio::test]
async fn test_admin_failures_are_fatal() {
    let fx = Fixture::new().await;
    fx.add_with(
        ADMIN_PLUGIN,
        PluginRequirements::new(),
        Behaviour {
            fail_config: true,
            fail_startup: false,
        },
    );
    let result = fx.scheduler().load_all(&entries(&["admin"])).await;
    assert!(matches!(result, Err(PluginSystemError::MandatoryPluginFailed { .. })));

    let fx = Fixture::new().await;
    fx.add_with(
        ADMIN_PLUGIN,
        PluginRequirements::new(),
        Behaviour {
            fail_config: false,
            fail_startup: true,
        },
    );
    let scheduler = fx.scheduler();
    let result = scheduler.load_all(&entries(&["admin"])).await;
    assert!(matches!(result, Err(PluginSystemError::MandatoryPluginFailed { .. })));
    assert!(scheduler.instances().is_empty());
}

#[tokio::test]
async fn test_config_failure_excludes_dependents() {
    let fx = Fixture::new().await;
    fx.add_with(
        "xlr",
        PluginRequirements::new(),
        Behaviour {
            fail_config: true,
            fail_startup: false,
        },
    );
    fx.add("stats", PluginRequirements::new().requires(&["xlr"]));
    fx.add("spree", PluginRequirements::new());

    let loaded = fx
        .scheduler()
        .load_all(&entries(&["admin", "xlr", "stats", "spree"]))
        .await
        .unwrap();
    assert_eq!(names(&loaded), vec!["admin", "spree"]);
}

#[tokio::test]
async fn test_startup_failure_disables_plugin() {
    let fx = Fixture::new().await;
    fx.add_with(
        "flaky",
        PluginRequirements::new(),
        Behaviour {
            fail_config: false,
            fail_startup: true,
        },
    );
    let scheduler = fx.scheduler();
    scheduler.load_all(&entries(&["admin", "flaky"])).await.unwrap();

    let flaky = scheduler.plugin("flaky").unwrap();
    assert!(!flaky.is_enabled());
}

#[tokio::test]
async fn test_required_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let present = dir.path().join("present.toml");
    std::fs::write(&present, "greeting = \"hello\"").unwrap();

    let fx = Fixture::new().await;
    fx.add("needs_file", PluginRequirements::new().config_file());
    fx.add("has_file", PluginRequirements::new().config_file());
    fx.add("optional", PluginRequirements::new());

    let plugin_entries = vec![
        PluginEntry::new("admin"),
        PluginEntry::new("needs_file").with_config(dir.path().join("missing.toml")),
        PluginEntry::new("has_file").with_config(&present),
        PluginEntry::new("optional").with_config(dir.path().join("missing.toml")),
    ];
    let loaded = fx.scheduler().load_all(&plugin_entries).await.unwrap();
    assert_eq!(names(&loaded), vec!["admin", "has_file", "optional"]);
}

#[tokio::test]
async fn test_disabled_entries_and_admin_override() {
    let fx = Fixture::new().await;
    fx.add("spree", PluginRequirements::new());
    let scheduler = fx.scheduler();
    let plugin_entries = vec![
        PluginEntry::new("admin").disabled(),
        PluginEntry::new("spree").disabled(),
    ];
    scheduler.load_all(&plugin_entries).await.unwrap();

    assert!(scheduler.plugin("admin").unwrap().is_enabled());
    assert!(!scheduler.plugin("spree").unwrap().is_enabled());

    scheduler.enable("spree").unwrap();
    assert!(scheduler.plugin("spree").unwrap().is_enabled());
    assert!(matches!(scheduler.disable("admin"), Err(PluginSystemError::Refused(_))));
    assert!(matches!(scheduler.disable("ghost"), Err(PluginSystemError::PluginNotFound(_))));
}

#[tokio::test]
async fn test_duplicate_entries_are_ignored() {
    let fx = Fixture::new().await;
    fx.add("spree", PluginRequirements::new());
    let loaded = fx
        .scheduler()
        .load_all(&entries(&["admin", "spree", "spree"]))
        .await
        .unwrap();
    assert_eq!(names(&loaded), vec!["admin", "spree"]);
}

#[tokio::test]
async fn test_handlers_follow_load_order_and_shutdown_removes_them() {
    let fx = Fixture::new().await;
    fx.add("b", PluginRequirements::new().load_after(&["c"]));
    fx.add("c", PluginRequirements::new());
    let scheduler = fx.scheduler();
    scheduler.load_all(&entries(&["admin", "b", "c"])).await.unwrap();

    let bus = fx.context.bus();
    let say = bus.event_id(keys::EVT_CLIENT_SAY).unwrap();
    let order: Vec<String> = bus
        .handlers_for(say)
        .iter()
        .map(|h| h.handler_name().to_string())
        .collect();
    assert_eq!(order, vec!["admin", "c", "b"]);
    assert_eq!(scheduler.plugin("c").unwrap().subscriptions(), vec![say]);

    scheduler.shutdown();
    assert!(bus.handlers_for(say).is_empty());
    assert!(scheduler.instances().is_empty());
}

#[tokio::test]
async fn test_reload_configs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spree.toml");
    std::fs::write(&path, "greeting = \"hello\"").unwrap();

    let fx = Fixture::new().await;
    fx.add("spree", PluginRequirements::new());
    let scheduler = fx.scheduler();
    scheduler
        .load_all(&[PluginEntry::new("admin"), PluginEntry::new("spree").with_config(&path)])
        .await
        .unwrap();

    let spree = scheduler.plugin("spree").unwrap();
    let say = Event::signal(fx.context.bus().event_id(keys::EVT_CLIENT_SAY).unwrap());
    spree.handle(&say).await.unwrap();

    std::fs::write(&path, "greeting = \"howdy\"").unwrap();
    assert_eq!(scheduler.reload_configs().await, 1);
    spree.handle(&say).await.unwrap();

    let journal = fx.journal();
    assert!(journal.contains(&"event:spree:hello".to_string()));
    assert!(journal.contains(&"event:spree:howdy".to_string()));
}

#[tokio::test]
async fn test_load_all_runs_once() {
    let fx = Fixture::new().await;
    let scheduler = fx.scheduler();
    scheduler.load_all(&entries(&["admin"])).await.unwrap();
    assert!(matches!(
        scheduler.load_all(&entries(&["admin"])).await,
        Err(PluginSystemError::Refused(_))
    ));
}
