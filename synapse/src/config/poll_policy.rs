use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded-retry policy for the jump pod readiness wait.
///
/// The wait is best-effort: exhausting the bound is not an error, the
/// session simply proceeds and lets the connection attempt fail downstream.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollPolicy {
    /// Maximum number of phase queries before giving up.
    #[serde(default = "PollPolicy::default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between consecutive phase queries, in seconds.
    #[serde(default = "PollPolicy::default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            interval_secs: Self::default_interval_secs(),
        }
    }
}

impl PollPolicy {
    #[inline]
    #[must_use]
    pub const fn default_max_attempts() -> u32 { 10 }

    #[inline]
    #[must_use]
    pub const fn default_interval_secs() -> u64 { 1 }

    #[inline]
    #[must_use]
    pub const fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs) }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::PollPolicy;

    #[test]
    fn test_default_bound() {
        let policy = PollPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let policy: PollPolicy = serde_yaml::from_str("maxAttempts: 3").unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.interval_secs, 1);
    }

    #[test]
    fn test_round_trip() {
        let original = PollPolicy { max_attempts: 7, interval_secs: 2 };
        let yaml = serde_yaml::to_string(&original).unwrap();
        let recovered: PollPolicy = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(original, recovered);
    }
}
