//! Tunable constants, loaded from the environment (§9 configuration
//! surface). Grounded on the teacher's `server::config::Config::from_env`.

use std::env;
use std::time::Duration;

use crate::rate_limiter::{BackoffPolicy, DomainQuota};

/// Process-wide tunables for the core components. Every field has a
/// sensible default drawn from the spec so a bare `CrawlkitConfig::default()`
/// is already production-usable; `from_env` lets an operator override any
/// of them.
#[derive(Debug, Clone)]
pub struct CrawlkitConfig {
    pub persistence_debounce: Duration,
    pub rate_limit_quota: DomainQuota,
    pub rate_limit_backoff: BackoffPolicy,
    pub cache_max_entries: usize,
    pub cache_ttl: chrono::Duration,
    pub content_cache_max_entries: usize,
    pub content_cache_ttl: chrono::Duration,
}

impl Default for CrawlkitConfig {
    fn default() -> Self {
        Self {
            persistence_debounce: Duration::from_millis(500),
            rate_limit_quota: DomainQuota::default(),
            rate_limit_backoff: BackoffPolicy::default(),
            cache_max_entries: 1000,
            cache_ttl: chrono::Duration::minutes(15),
            content_cache_max_entries: 500,
            content_cache_ttl: chrono::Duration::hours(1),
        }
    }
}

impl CrawlkitConfig {
    /// Load overrides from the environment, falling back to
    /// [`CrawlkitConfig::default`] for anything unset. Loads a `.env` file
    /// if present, same as the teacher's service configs.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Self {
            persistence_debounce: env_millis("CRAWLKIT_PERSISTENCE_DEBOUNCE_MS")
                .unwrap_or(defaults.persistence_debounce),
            rate_limit_quota: DomainQuota {
                per_minute: env_u32("CRAWLKIT_RATE_LIMIT_PER_MINUTE")
                    .unwrap_or(defaults.rate_limit_quota.per_minute),
                burst: env_u32("CRAWLKIT_RATE_LIMIT_BURST")
                    .unwrap_or(defaults.rate_limit_quota.burst),
            },
            rate_limit_backoff: defaults.rate_limit_backoff,
            cache_max_entries: env_usize("CRAWLKIT_CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.cache_max_entries),
            cache_ttl: defaults.cache_ttl,
            content_cache_max_entries: env_usize("CRAWLKIT_CONTENT_CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.content_cache_max_entries),
            content_cache_ttl: defaults.content_cache_ttl,
        }
    }
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_u32(key).map(|ms| Duration::from_millis(ms as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_spec_defaults() {
        let cfg = CrawlkitConfig::default();
        assert_eq!(cfg.rate_limit_quota.per_minute, 10);
        assert_eq!(cfg.rate_limit_quota.burst, 3);
    }
}
