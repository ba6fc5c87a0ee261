//! The [`Action`] produced by decoding one log line.

use std::collections::HashMap;

/// Verb given to lines no rule recognised.
pub const UNKNOWN_VERB: &str = "unknown";

/// A recognised log line: the rule's verb plus the captured fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    verb: String,
    fields: HashMap<String, String>,
    raw: String,
}

impl Action {
    pub fn new(verb: impl Into<String>, fields: HashMap<String, String>, raw: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            fields,
            raw: raw.into(),
        }
    }

    /// Action for a line no rule matched.
    pub fn unknown(raw: impl Into<String>) -> Self {
        Self::new(UNKNOWN_VERB, HashMap::new(), raw)
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn fields(&self) -> &HashMap<String, String> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_unknown(&self) -> bool {
        self.verb == UNKNOWN_VERB
    }
}
