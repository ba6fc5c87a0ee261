//! Version strings and minimum-version checks.

use std::cmp::Ordering;
use std::fmt;

/// Version of the host that plugins are checked against.
pub const WARDEN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A `major.minor.patch` triple. Missing components count as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// Parses `"1"`, `"1.2"` or `"1.2.3"`. Anything else yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = [0u32; 3];
        let mut count = 0;
        for piece in text.trim().split('.') {
            if count == parts.len() {
                return None;
            }
            parts[count] = piece.parse().ok()?;
            count += 1;
        }
        Some(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Checks `current` against a plugin's minimum `required` version.
///
/// # Returns
///
/// `Ok(())` if `current >= required`, otherwise a message describing the
/// mismatch or the unparseable version.
pub fn check_minimum(required: &str, current: &str) -> Result<(), String> {
    let wanted = Version::parse(required)
        .ok_or_else(|| format!("unparseable required version '{}'", required))?;
    let have = Version::parse(current)
        .ok_or_else(|| format!("unparseable host version '{}'", current))?;

    match have.cmp(&wanted) {
        Ordering::Less => Err(format!("requires version {} but host is {}", wanted, have)),
        _ => Ok(()),
    }
}
