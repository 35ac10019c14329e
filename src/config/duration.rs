//! Human-readable durations ("500ms", "2s", "1m") for timing settings.

use std::time::Duration;

/// Parse a duration string like "10s", "1m", "500ms".
///
/// A bare number is taken as seconds. Returns `None` if the string cannot be
/// parsed.
///
/// ```
/// use run_local::config::parse_duration_string;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration_string("250ms"), Some(Duration::from_millis(250)));
/// assert_eq!(parse_duration_string("2s"), Some(Duration::from_secs(2)));
/// assert_eq!(parse_duration_string("1m"), Some(Duration::from_secs(60)));
/// assert_eq!(parse_duration_string("3"), Some(Duration::from_secs(3)));
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.trim().parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs.trim().parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return mins
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs);
    }
    s.parse::<u64>().ok().map(Duration::from_secs)
}

/// Render a duration the way [`parse_duration_string`] reads it back.
pub fn format_duration(d: Duration) -> String {
    if d.subsec_millis() != 0 || d.as_secs() == 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}s", d.as_secs())
    }
}

/// `#[serde(with = "...")]` adapter storing a `Duration` as a duration string.
pub mod serde_str {
    use super::{format_duration, parse_duration_string};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_duration_string(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid duration '{}' (expected e.g. 500ms, 2s, 1m)",
                raw
            ))
        })
    }
}
