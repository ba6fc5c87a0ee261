//! The [`Event`] value type.

use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric id of an event key, issued by the [`EventCatalog`](crate::EventCatalog).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u32);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to a game client as seen in the server log.
///
/// `cid` is the slot number the server assigned; name and guid are filled in
/// when the log has told us about them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRef {
    pub cid: String,
    pub name: Option<String>,
    pub guid: Option<String>,
}

impl IdentityRef {
    pub fn new(cid: impl Into<String>) -> Self {
        Self {
            cid: cid.into(),
            name: None,
            guid: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }

    /// Name if known, otherwise the slot id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.cid)
    }
}

/// A typed notification travelling through the bus.
///
/// Events are built with the consuming `with_*` methods and are not mutated
/// once published; handlers only ever see `&Event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    type_id: EventId,
    data: serde_json::Value,
    client: Option<IdentityRef>,
    target: Option<IdentityRef>,
    created_at: u64,
}

impl Event {
    /// Creates an event of the given type carrying `data`.
    pub fn new(type_id: EventId, data: serde_json::Value) -> Self {
        Self {
            type_id,
            data,
            client: None,
            target: None,
            created_at: current_timestamp(),
        }
    }

    /// Creates an event with no payload.
    pub fn signal(type_id: EventId) -> Self {
        Self::new(type_id, serde_json::Value::Null)
    }

    pub fn with_client(mut self, client: IdentityRef) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_target(mut self, target: IdentityRef) -> Self {
        self.target = Some(target);
        self
    }

    pub fn type_id(&self) -> EventId {
        self.type_id
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Reads a string field out of an object payload.
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(|value| value.as_str())
    }

    pub fn client(&self) -> Option<&IdentityRef> {
        self.client.as_ref()
    }

    pub fn target(&self) -> Option<&IdentityRef> {
        self.target.as_ref()
    }

    /// Unix timestamp (seconds) at which the event was created.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }
}
