//! Ordered line grammars.
//!
//! A [`Grammar`] is a list of [`LineRule`]s tried top to bottom; the first
//! rule whose pattern matches decides the verb. General catch-all patterns
//! therefore belong at the end, and reordering rules changes how lines are
//! classified.

use crate::action::Action;
use crate::error::ParserError;
use regex::{Captures, Regex};
use std::collections::HashMap;

/// Custom field extraction for rules whose captures need post-processing.
pub type FieldExtractor = fn(&Captures<'_>) -> HashMap<String, String>;

/// One (pattern, verb, extractor) entry.
#[derive(Debug, Clone)]
pub struct LineRule {
    verb: String,
    pattern: Regex,
    extractor: Option<FieldExtractor>,
}

impl LineRule {
    /// Compiles a rule whose fields are its named capture groups.
    pub fn new(verb: &str, pattern: &str) -> Result<Self, ParserError> {
        let pattern = Regex::new(pattern).map_err(|source| ParserError::Pattern {
            verb: verb.to_string(),
            source,
        })?;
        Ok(Self {
            verb: verb.to_string(),
            pattern,
            extractor: None,
        })
    }

    pub fn with_extractor(mut self, extractor: FieldExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Matches `line` (already stripped of its prefix) against this rule.
    ///
    /// `raw` is carried into the resulting action unchanged.
    pub fn apply(&self, line: &str, raw: &str) -> Option<Action> {
        let captures = self.pattern.captures(line)?;
        let fields = match self.extractor {
            Some(extract) => extract(&captures),
            None => named_fields(&self.pattern, &captures),
        };
        Some(Action::new(self.verb.clone(), fields, raw))
    }
}

fn named_fields(pattern: &Regex, captures: &Captures<'_>) -> HashMap<String, String> {
    pattern
        .capture_names()
        .flatten()
        .filter_map(|name| {
            captures
                .name(name)
                .map(|value| (name.to_string(), value.as_str().to_string()))
        })
        .collect()
}

/// A complete line grammar for one game.
#[derive(Debug, Clone)]
pub struct Grammar {
    name: String,
    rules: Vec<LineRule>,
    noise: Vec<Regex>,
    line_prefix: Option<Regex>,
}

impl Grammar {
    pub fn builder(name: &str) -> GrammarBuilder {
        GrammarBuilder {
            name: name.to_string(),
            rules: Vec::new(),
            noise: Vec::new(),
            line_prefix: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[LineRule] {
        &self.rules
    }

    /// Removes the per-line prefix (typically a timestamp), if configured.
    pub fn strip_prefix<'a>(&self, line: &'a str) -> &'a str {
        match &self.line_prefix {
            Some(prefix) => match prefix.find(line) {
                Some(found) if found.start() == 0 => &line[found.end()..],
                _ => line,
            },
            None => line,
        }
    }

    /// First matching rule's action.
    pub fn match_line(&self, line: &str, raw: &str) -> Option<Action> {
        self.rules.iter().find_map(|rule| rule.apply(line, raw))
    }

    pub fn is_noise(&self, line: &str) -> bool {
        self.noise.iter().any(|pattern| pattern.is_match(line))
    }
}

/// Builder collecting rules in priority order.
#[derive(Debug)]
pub struct GrammarBuilder {
    name: String,
    rules: Vec<(String, String, Option<FieldExtractor>)>,
    noise: Vec<String>,
    line_prefix: Option<String>,
}

impl GrammarBuilder {
    /// Appends a rule; earlier rules win over later ones.
    pub fn rule(mut self, verb: &str, pattern: &str) -> Self {
        self.rules.push((verb.to_string(), pattern.to_string(), None));
        self
    }

    pub fn rule_with(mut self, verb: &str, pattern: &str, extractor: FieldExtractor) -> Self {
        self.rules
            .push((verb.to_string(), pattern.to_string(), Some(extractor)));
        self
    }

    /// Lines matching a noise pattern are dropped silently.
    pub fn noise(mut self, pattern: &str) -> Self {
        self.noise.push(pattern.to_string());
        self
    }

    pub fn line_prefix(mut self, pattern: &str) -> Self {
        self.line_prefix = Some(pattern.to_string());
        self
    }

    /// Compiles every pattern.
    pub fn build(self) -> Result<Grammar, ParserError> {
        let rules = self
            .rules
            .into_iter()
            .map(|(verb, pattern, extractor)| {
                let rule = LineRule::new(&verb, &pattern)?;
                Ok(match extractor {
                    Some(extract) => rule.with_extractor(extract),
                    None => rule,
                })
            })
            .collect::<Result<Vec<_>, ParserError>>()?;

        let compile = |label: &str, pattern: &str| {
            Regex::new(pattern).map_err(|source| ParserError::Pattern {
                verb: label.to_string(),
                source,
            })
        };
        let noise = self
            .noise
            .iter()
            .map(|pattern| compile("<noise>", pattern))
            .collect::<Result<Vec<_>, _>>()?;
        let line_prefix = self
            .line_prefix
            .as_deref()
            .map(|pattern| compile("<prefix>", pattern))
            .transpose()?;

        Ok(Grammar {
            name: self.name,
            rules,
            noise,
            line_prefix,
        })
    }
}
