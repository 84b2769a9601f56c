//! Time utilities for sing-xboard
//!
//! Snapshot and log timestamps are unix milliseconds; panel timestamps are
//! unix seconds.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Get the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is set before the Unix epoch.
///
/// # Examples
/// ```
/// use sx_core::time::current_time_millis;
///
/// let now = current_time_millis();
/// assert!(now > 0);
/// ```
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Get the current Unix timestamp in seconds.
pub fn current_time_secs() -> i64 {
    Utc::now().timestamp()
}

/// Parse a panel timestamp into unix seconds.
///
/// Accepts integer seconds (as a string) and RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<i64>() {
        return Some(secs);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_millis_is_positive() {
        assert!(current_time_millis() > 0);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1700000000"), Some(1_700_000_000));
        assert_eq!(
            parse_timestamp("2023-11-14T22:13:20Z"),
            Some(1_700_000_000)
        );
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("next tuesday"), None);
    }
}
