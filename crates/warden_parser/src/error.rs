//! Error types for the parser crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The log source could not be opened
    #[error("Cannot open log source {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// A grammar pattern failed to compile
    #[error("Invalid pattern for '{verb}': {source}")]
    Pattern {
        verb: String,
        #[source]
        source: regex::Error,
    },
    /// No bundled grammar exists for the configured game
    #[error("Unsupported game: {0}")]
    UnsupportedGame(String),
}
