//! Wire framing for RCON datagrams.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Out-of-band marker that starts every request and reply datagram.
pub const OOB_PREFIX: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// Marker the server puts in front of every reply payload.
pub const PRINT_MARKER: &str = "print\n";

lazy_static! {
    /// Commands the server never answers (or answers only after reloading the
    /// map). They are sent exactly once.
    static ref NO_REPLY_COMMANDS: Regex =
        Regex::new(r"(?i)^\s*(quit|killserver|map|map_restart|devmap|spmap)(\s|$)")
            .expect("no-reply pattern is valid");
}

/// Text encoding used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1; characters outside the range are sent as `?`
    Latin1,
}

impl TextEncoding {
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

/// Builds a request datagram: prefix, `rcon "<password>" <command>`, newline.
pub fn encode_request(password: &str, command: &str, encoding: TextEncoding) -> Vec<u8> {
    let body = format!("rcon \"{}\" {}\n", password, command);
    let mut packet = Vec::with_capacity(OOB_PREFIX.len() + body.len());
    packet.extend_from_slice(&OOB_PREFIX);
    packet.extend_from_slice(&encoding.encode(&body));
    packet
}

/// Decodes a reply datagram into its payload text.
///
/// The out-of-band prefix is required. The first `print\n` marker is removed;
/// any later occurrence is part of the payload.
///
/// # Returns
///
/// `None` if the datagram does not start with the prefix.
pub fn decode_reply(datagram: &[u8], encoding: TextEncoding) -> Option<String> {
    let payload = datagram.strip_prefix(&OOB_PREFIX[..])?;
    let text = encoding.decode(payload);
    Some(text.replacen(PRINT_MARKER, "", 1))
}

/// True for commands that must never be retried.
pub fn is_no_reply_command(command: &str) -> bool {
    NO_REPLY_COMMANDS.is_match(command)
}
