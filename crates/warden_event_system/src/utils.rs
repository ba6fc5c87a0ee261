//! Small helpers shared across the event system.

use std::time::Duration;

/// Returns the current Unix timestamp in seconds.
///
/// A clock set before the Unix epoch yields `0` rather than panicking.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Formats a duration as milliseconds with one decimal, for log lines.
pub(crate) fn millis(duration: Duration) -> String {
    format!("{:.1}ms", duration.as_secs_f64() * 1000.0)
}
