//! Sync engine configuration.
//!
//! All intervals are stored as milliseconds so the config can round-trip
//! through JSON/TOML without custom duration serializers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for failed queue items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Base delay before the first retry, in milliseconds.
    pub base_delay_ms: i64,

    /// Upper bound on the computed backoff delay, in milliseconds.
    pub max_delay_ms: i64,

    /// Retry ceiling. An item whose retry count exceeds this value
    /// becomes terminally failed and is excluded from retry scans.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Compute the backoff delay for a given retry count: `base * 2^retry`,
    /// capped at `max_delay_ms`.
    pub fn delay_for(&self, retry_count: u32) -> i64 {
        let shift = retry_count.min(30);
        self.base_delay_ms
            .saturating_mul(1_i64 << shift)
            .min(self.max_delay_ms)
    }
}

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Sync server URL (e.g., "wss://sync.cowrite.app").
    pub server_url: Option<String>,

    /// Interval between queue worker ticks, in milliseconds.
    pub queue_interval_ms: u64,

    /// Interval between auto-sync sweeps over dirty documents, in milliseconds.
    pub auto_sync_interval_ms: u64,

    /// Interval between keepalive pings on an active session, in milliseconds.
    pub ping_interval_ms: u64,

    /// Retry policy applied to failed queue items.
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            queue_interval_ms: 10_000,
            auto_sync_interval_ms: 30_000,
            ping_interval_ms: 30_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn queue_interval(&self) -> Duration {
        Duration::from_millis(self.queue_interval_ms)
    }

    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_millis(self.auto_sync_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.queue_interval(), Duration::from_secs(10));
        assert_eq!(config.auto_sync_interval(), Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            max_retries: 5,
        };
        assert_eq!(policy.delay_for(0), 1_000);
        assert_eq!(policy.delay_for(1), 2_000);
        assert_eq!(policy.delay_for(2), 4_000);
        assert_eq!(policy.delay_for(3), 8_000);
        // Capped from here on
        assert_eq!(policy.delay_for(4), 10_000);
        assert_eq!(policy.delay_for(60), 10_000);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = SyncConfig {
            server_url: Some("wss://sync.example.org".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: SyncConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }
}
