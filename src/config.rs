use serde::Deserialize;
use std::time::Duration;

/// Policy knobs for automated collections and the background sweep.
///
/// Deserializable so the daemon can load it from a JSON file; the library
/// takes the struct directly. Defaults mirror the standard pool policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectionPolicy {
    /// Hours after a round's due date before a collection becomes eligible.
    pub grace_period_hours: i64,
    /// Maximum automated charge attempts per collection.
    pub max_attempts: u32,
    /// Base retry interval in hours; doubles with each failed attempt.
    pub retry_interval_hours: i64,
    /// Ceiling on the computed backoff, in hours.
    pub retry_ceiling_hours: i64,
    /// Days past the due date before an exhausted collection escalates.
    pub escalate_after_days: i64,
    /// Whether exhausted collections notify the pool admin.
    pub escalate_to_admin: bool,
    /// Deadline for a single payment-processor call.
    pub charge_timeout_secs: u64,
    /// A collection stuck in `processing` longer than this is reclaimed.
    pub stuck_processing_secs: i64,
    /// Cadence of the background sweep loop.
    pub sweep_interval_secs: u64,
}

impl Default for CollectionPolicy {
    fn default() -> Self {
        Self {
            grace_period_hours: 24,
            max_attempts: 3,
            retry_interval_hours: 12,
            retry_ceiling_hours: 96,
            escalate_after_days: 3,
            escalate_to_admin: true,
            charge_timeout_secs: 30,
            stuck_processing_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl CollectionPolicy {
    pub fn charge_timeout(&self) -> Duration {
        Duration::from_secs(self.charge_timeout_secs)
    }

    pub fn retry_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retry_interval_hours)
    }

    pub fn retry_ceiling(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retry_ceiling_hours)
    }

    pub fn stuck_processing(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stuck_processing_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = CollectionPolicy::default();
        assert_eq!(policy.grace_period_hours, 24);
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.escalate_to_admin);
    }

    #[test]
    fn test_partial_json_overrides() {
        let policy: CollectionPolicy =
            serde_json::from_str(r#"{"max_attempts": 5, "escalate_to_admin": false}"#).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert!(!policy.escalate_to_admin);
        // Unspecified fields keep their defaults
        assert_eq!(policy.retry_interval_hours, 12);
    }
}
