use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Storage orchestrator tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Distinct providers a write must reach before it is durable
    pub redundancy: usize,
    /// Payloads larger than this are split into chunks plus a manifest
    pub chunk_size: usize,
    /// Per provider call timeout in milliseconds
    pub call_timeout_ms: u64,
    /// Consecutive failed health checks before a provider is `Unavailable`
    pub unavailable_after: u32,
    /// Whole-operation retry rounds before `StorageUnavailable`
    pub retry_rounds: u32,
    /// Backoff before the first retry round, doubled every round
    pub retry_backoff_ms: u64,
    /// Period of the background health monitor
    pub health_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            redundancy: 2,
            chunk_size: 4 * 1024 * 1024,
            call_timeout_ms: 10_000,
            unavailable_after: 3,
            retry_rounds: 3,
            retry_backoff_ms: 200,
            health_interval_ms: 30_000,
        }
    }
}

impl StorageConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn retry_backoff(&self, round: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(1u64 << round.min(16)))
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }
}

/// Registry and ledger tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// File slots per vault shard
    pub shard_capacity: u16,
    /// Shards a single vault may own
    pub max_shards: u8,
    /// Per ledger call timeout in milliseconds
    pub call_timeout_ms: u64,
    /// Attempts per ledger call, including the first
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            shard_capacity: 100,
            max_shards: 10,
            call_timeout_ms: 5_000,
            max_attempts: 4,
            base_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

impl RegistryConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Exponential backoff after failed attempt `attempt` (0-based), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let millis = self
            .base_backoff_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Session key cache tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fixed lifetime of a derived key set in seconds
    pub key_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { key_ttl_secs: 15 * 60 }
    }
}

impl SessionConfig {
    pub fn key_ttl(&self) -> Duration {
        Duration::from_secs(self.key_ttl_secs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_registry_backoff_is_capped() {
        let config = RegistryConfig::default();
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(800));
        assert_eq!(config.backoff(10), Duration::from_millis(2_000));
        assert_eq!(config.backoff(u32::MAX), Duration::from_millis(2_000));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: StorageConfig = serde_json::from_str(r#"{ "redundancy": 1 }"#).unwrap();
        assert_eq!(config.redundancy, 1);
        assert_eq!(config.chunk_size, 4 * 1024 * 1024);
        assert_eq!(config.retry_backoff(2), Duration::from_millis(800));
    }
}
