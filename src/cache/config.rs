//! Cache configuration.
//!
//! Controls counter sharding, key lifetimes and user-set hydration via `kudos.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_SHARD_COUNT: usize = 5;
const DEFAULT_COUNTER_TTL_SECONDS: u64 = 24 * 60 * 60;
const DEFAULT_USER_ACTIONS_TTL_SECONDS: u64 = 24 * 60 * 60;
const DEFAULT_HYDRATE_LIMIT: usize = 600;

/// Cache configuration from `kudos.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of hash shards per counter scope.
    pub shard_count: usize,
    /// Lifetime of a counter shard key, applied only when the key has none.
    pub counter_ttl_seconds: u64,
    /// Lifetime of a user-action set, applied only when the key has none.
    pub user_actions_ttl_seconds: u64,
    /// Most recent likes loaded into a user-action set on hydration.
    pub hydrate_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            counter_ttl_seconds: DEFAULT_COUNTER_TTL_SECONDS,
            user_actions_ttl_seconds: DEFAULT_USER_ACTIONS_TTL_SECONDS,
            hydrate_limit: DEFAULT_HYDRATE_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            shard_count: settings.shard_count.get(),
            counter_ttl_seconds: settings.counter_ttl.as_secs(),
            user_actions_ttl_seconds: settings.user_actions_ttl.as_secs(),
            hydrate_limit: settings.hydrate_limit.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the shard count as NonZeroUsize, clamping to 1 if zero.
    pub fn shard_count_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.shard_count).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn counter_ttl(&self) -> Duration {
        Duration::from_secs(self.counter_ttl_seconds)
    }

    pub fn user_actions_ttl(&self) -> Duration {
        Duration::from_secs(self.user_actions_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.shard_count, 5);
        assert_eq!(config.hydrate_limit, 600);
        assert_eq!(config.counter_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.user_actions_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            shard_count: 0,
            ..Default::default()
        };
        assert_eq!(config.shard_count_non_zero().get(), 1);
    }
}
