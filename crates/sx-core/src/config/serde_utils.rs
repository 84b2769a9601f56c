//! Shared serialization/deserialization utilities for configuration
//!
//! Durations are stored as plain integers so the TOML stays readable. Use
//! `duration_secs` for coarse settings and `duration_millis` where
//! sub-second values matter.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct Config {
//!     #[serde(with = "sx_core::config::serde_utils::duration_millis")]
//!     tick_interval: Duration,
//! }
//! ```

/// Duration as whole seconds (u64)
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Duration as whole milliseconds (u64)
pub mod duration_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "duration_secs")]
        fetch: Duration,
        #[serde(with = "duration_millis")]
        tick: Duration,
    }

    #[test]
    fn test_durations_serialize_as_integers() {
        let t = Timeouts {
            fetch: Duration::from_secs(30),
            tick: Duration::from_millis(250),
        };
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"fetch":30,"tick":250}"#);
    }

    #[test]
    fn test_durations_from_toml() {
        let t: Timeouts = toml::from_str("fetch = 5\ntick = 1500\n").unwrap();
        assert_eq!(t.fetch, Duration::from_secs(5));
        assert_eq!(t.tick, Duration::from_millis(1500));
    }

    #[test]
    fn test_secs_truncates_sub_second_part() {
        let t = Timeouts {
            fetch: Duration::from_millis(2900),
            tick: Duration::ZERO,
        };
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"fetch":2,"tick":0}"#);
    }
}
