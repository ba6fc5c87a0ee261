//! # Warden Parser
//!
//! Front end of the event pipeline: turns a growing server log into typed
//! events.
//!
//! ```text
//! LogReader ──lines──▶ LineDecoder ──Action──▶ EventTranslator ──Event──▶ EventBus
//! ```
//!
//! * [`reader`] - incremental, rotation-aware log tailing
//! * [`grammar`] - ordered line rules (first match wins)
//! * [`decoder`] - applies a grammar to one line
//! * [`translator`] - verb → event functions and the fallback table
//! * [`games`] - bundled grammars

pub mod action;
pub mod decoder;
pub mod error;
pub mod games;
pub mod grammar;
pub mod reader;
pub mod translator;

pub use action::{Action, UNKNOWN_VERB};
pub use decoder::{DecoderStats, LineDecoder};
pub use error::ParserError;
pub use grammar::{FieldExtractor, Grammar, GrammarBuilder, LineRule};
pub use reader::LogReader;
pub use translator::{EventTranslator, TranslateContext, TranslateFn};
