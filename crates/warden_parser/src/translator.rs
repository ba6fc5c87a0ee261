//! Maps decoded [`Action`]s to [`Event`]s.
//!
//! Each verb is looked up in an explicit verb → function table built when
//! the translator is constructed. Verbs without a function but listed in the
//! fallback table become a minimal event carrying the action's fields; any
//! other verb becomes an `EVT_UNKNOWN` event.

use crate::action::Action;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_event_system::{keys, Event, EventCatalog, EventId, IdentityRef};

/// Per-verb translation function.
pub type TranslateFn = fn(&Action, &mut TranslateContext) -> Option<Event>;

/// State available to translation functions: the event catalog and the
/// clients currently known from the log.
#[derive(Debug)]
pub struct TranslateContext {
    catalog: Arc<EventCatalog>,
    roster: HashMap<String, IdentityRef>,
}

impl TranslateContext {
    pub fn new(catalog: Arc<EventCatalog>) -> Self {
        Self {
            catalog,
            roster: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<EventCatalog> {
        &self.catalog
    }

    /// Id for `key`, registering it on first use.
    pub fn event_id(&self, key: &str) -> EventId {
        self.catalog.register(key, key)
    }

    /// Identity for a client slot, falling back to a bare slot reference.
    pub fn client(&self, cid: &str) -> IdentityRef {
        self.roster
            .get(cid)
            .cloned()
            .unwrap_or_else(|| IdentityRef::new(cid))
    }

    /// Finds a known client by name.
    pub fn client_by_name(&self, name: &str) -> Option<IdentityRef> {
        self.roster
            .values()
            .find(|client| client.name.as_deref() == Some(name))
            .cloned()
    }

    /// Adds or replaces a roster entry.
    pub fn remember(&mut self, client: IdentityRef) {
        self.roster.insert(client.cid.clone(), client);
    }

    pub fn forget(&mut self, cid: &str) -> Option<IdentityRef> {
        self.roster.remove(cid)
    }

    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }
}

/// Converts the fields of an action into a JSON object.
pub fn fields_to_json(action: &Action) -> Value {
    let object: Map<String, Value> = action
        .fields()
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();
    Value::Object(object)
}

/// Verb-dispatching translator.
#[derive(Debug)]
pub struct EventTranslator {
    context: TranslateContext,
    handlers: HashMap<String, TranslateFn>,
    fallback: HashMap<String, String>,
}

impl EventTranslator {
    pub fn new(catalog: Arc<EventCatalog>) -> Self {
        Self {
            context: TranslateContext::new(catalog),
            handlers: HashMap::new(),
            fallback: HashMap::new(),
        }
    }

    /// Registers the function for `verb`.
    pub fn on(mut self, verb: &str, translate: TranslateFn) -> Self {
        self.handlers.insert(verb.to_string(), translate);
        self
    }

    /// Maps `verb` to a minimal event of type `event_key`.
    pub fn fallback(mut self, verb: &str, event_key: &str) -> Self {
        self.context.event_id(event_key);
        self.fallback
            .insert(verb.to_string(), event_key.to_string());
        self
    }

    pub fn context(&self) -> &TranslateContext {
        &self.context
    }

    /// Translates one action into at most one event.
    pub fn translate(&mut self, action: &Action) -> Option<Event> {
        if let Some(translate) = self.handlers.get(action.verb()) {
            return translate(action, &mut self.context);
        }

        if let Some(event_key) = self.fallback.get(action.verb()) {
            let type_id = self.context.event_id(event_key);
            let mut event = Event::new(type_id, fields_to_json(action));
            if let Some(cid) = action.field("cid") {
                event = event.with_client(self.context.client(cid));
            }
            return Some(event);
        }

        let unknown = self.context.event_id(keys::EVT_UNKNOWN);
        if action.is_unknown() {
            debug!("Forwarding unrecognised line as {}", keys::EVT_UNKNOWN);
            return Some(Event::new(unknown, json!({ "raw": action.raw() })));
        }

        warn!(
            "❓ No translation for verb '{}', emitting {}",
            action.verb(),
            keys::EVT_UNKNOWN
        );
        Some(Event::new(
            unknown,
            json!({ "verb": action.verb(), "raw": action.raw() }),
        ))
    }
}
