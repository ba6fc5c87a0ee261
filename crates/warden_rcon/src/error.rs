//! Error types for the RCON client.
//!
//! These never escape [`RconClient::send`](crate::RconClient::send); they are
//! produced per attempt and logged.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RconError {
    /// The server address could not be resolved or the socket not bound
    #[error("Connection setup failed: {0}")]
    Setup(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The socket did not become writable in time
    #[error("Timed out waiting to send")]
    WriteTimeout,
    /// No reply arrived in time
    #[error("Timed out waiting for reply")]
    ReadTimeout,
    /// A datagram arrived without the out-of-band prefix
    #[error("Malformed reply: {0}")]
    MalformedReply(String),
    /// The client was closed
    #[error("Client closed")]
    Closed,
}
