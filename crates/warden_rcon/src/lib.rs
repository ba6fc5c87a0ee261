//! # Warden RCON
//!
//! Client for the Quake 3 family remote-console protocol: connectionless
//! datagrams prefixed with four `0xFF` bytes, carrying
//! `rcon "<password>" <command>` requests and `print\n` replies.
//!
//! The client never surfaces transport errors to callers. A command that could
//! not be delivered after the configured retries yields an empty reply and an
//! error log line; callers decide whether an empty reply matters.
//!
//! * [`protocol`] - framing, text encodings, no-reply command detection
//! * [`client`] - [`RconClient`] with synchronous sends, a fire-and-forget
//!   burst queue and orderly close
//! * [`config`] - [`RconConfig`] and its defaults

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;

pub use client::{RconClient, RconStats};
pub use config::RconConfig;
pub use error::RconError;
pub use protocol::TextEncoding;
