//! Bundled game grammars.

mod q3a;

use crate::error::ParserError;
use crate::grammar::Grammar;
use crate::translator::EventTranslator;
use std::sync::Arc;
use warden_event_system::EventCatalog;

/// Games with a bundled grammar.
pub const SUPPORTED_GAMES: &[&str] = &["q3a"];

/// Maps a configured game name or alias to its bundled grammar name.
///
/// Matching is case-insensitive; `None` means no grammar is bundled.
pub fn canonical_name(game: &str) -> Option<&'static str> {
    match game.to_ascii_lowercase().as_str() {
        "q3a" | "ioq3" | "quake3" => Some("q3a"),
        _ => None,
    }
}

/// Builds the grammar and translator for `game`.
///
/// # Arguments
///
/// * `game` - Game name from the configuration (case-insensitive)
/// * `catalog` - Catalog the translator resolves event keys against
///
/// # Returns
///
/// The compiled grammar and a translator with an empty client roster, or
/// [`ParserError::UnsupportedGame`] for an unknown name.
pub fn load(game: &str, catalog: Arc<EventCatalog>) -> Result<(Grammar, EventTranslator), ParserError> {
    match canonical_name(game) {
        Some("q3a") => Ok((q3a::grammar()?, q3a::translator(catalog))),
        _ => Err(ParserError::UnsupportedGame(game.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_known_game() {
        let (grammar, _translator) = load("Q3A", Arc::new(EventCatalog::standard())).unwrap();
        assert_eq!(grammar.name(), "q3a");
    }

    #[test]
    fn test_aliases_resolve_to_a_loadable_grammar() {
        for alias in ["ioq3", "Quake3", "Q3A"] {
            assert_eq!(canonical_name(alias), Some("q3a"));
            assert!(load(alias, Arc::new(EventCatalog::standard())).is_ok());
        }
        assert_eq!(canonical_name("pong"), None);
        for game in SUPPORTED_GAMES {
            assert_eq!(canonical_name(game), Some(*game));
        }
    }

    #[test]
    fn test_unknown_game_is_rejected() {
        let result = load("pong", Arc::new(EventCatalog::standard()));
        assert!(matches!(result, Err(ParserError::UnsupportedGame(name)) if name == "pong"));
    }
}
