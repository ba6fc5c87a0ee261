//! Applies a [`Grammar`] to raw log lines.

use crate::action::Action;
use crate::grammar::Grammar;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{trace, warn};

/// Decoding counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStats {
    pub matched: u64,
    pub unknown: u64,
    pub ignored: u64,
}

/// Decodes lines into [`Action`]s.
#[derive(Debug)]
pub struct LineDecoder {
    grammar: Grammar,
    matched: AtomicU64,
    unknown: AtomicU64,
    ignored: AtomicU64,
}

impl LineDecoder {
    pub fn new(grammar: Grammar) -> Self {
        Self {
            grammar,
            matched: AtomicU64::new(0),
            unknown: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Decodes one line.
    ///
    /// # Returns
    ///
    /// * `Some(action)` from the first matching rule
    /// * `None` for blank lines and known noise
    /// * `Some(Action::unknown(line))` otherwise, after logging a warning
    pub fn decode(&self, line: &str) -> Option<Action> {
        let raw = line.trim_end_matches(['\r', '\n']);
        let body = self.grammar.strip_prefix(raw).trim_end();
        if body.trim().is_empty() || self.grammar.is_noise(body) {
            self.ignored.fetch_add(1, Ordering::Relaxed);
            trace!("Ignoring line: {:?}", raw);
            return None;
        }

        match self.grammar.match_line(body, raw) {
            Some(action) => {
                self.matched.fetch_add(1, Ordering::Relaxed);
                Some(action)
            }
            None => {
                self.unknown.fetch_add(1, Ordering::Relaxed);
                warn!("❓ Unrecognised {} log line: {:?}", self.grammar.name(), raw);
                Some(Action::unknown(raw))
            }
        }
    }

    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            matched: self.matched.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }
}
