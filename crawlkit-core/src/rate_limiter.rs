//! Per-domain token-bucket rate limiting with backoff-on-retry (§4.2).
//!
//! Grounded on the teacher's `crawlers::rate_limited::RateLimitedCrawler`,
//! generalized from a single fixed quota wrapping one crawler to a
//! per-domain keyed limiter backing every domain this process talks to.
//! `governor` only gives us the token bucket; the exponential-backoff-with-
//! jitter behavior on retry and cooperative cancellation are layered on
//! top here.

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{CoreResult, RateLimitError};

/// Per-domain acquisition parameters (§4.2 default: 10 req/min, burst 3).
#[derive(Debug, Clone, Copy)]
pub struct DomainQuota {
    pub per_minute: u32,
    pub burst: u32,
}

impl Default for DomainQuota {
    fn default() -> Self {
        Self {
            per_minute: 10,
            burst: 3,
        }
    }
}

impl DomainQuota {
    fn to_governor_quota(self) -> Quota {
        let per_minute = NonZeroU32::new(self.per_minute.max(1)).unwrap();
        let burst = NonZeroU32::new(self.burst.max(1)).unwrap();
        Quota::per_minute(per_minute).allow_burst(burst)
    }
}

/// `min(base*2^attempt, max_delay) +/- base*jitter_factor` (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// Compute the delay for `attempt` (0-indexed), deterministic given
    /// `jitter_unit` in `[-1.0, 1.0]` so callers can inject an RNG sample
    /// without this module depending on one directly.
    pub fn delay_for(&self, attempt: u32, jitter_unit: f64) -> Duration {
        let jitter_factor = self.jitter_factor.min(0.3);
        let exp = self.base.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        let jitter = self.base.as_secs_f64() * jitter_factor * jitter_unit.clamp(-1.0, 1.0);
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }
}

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-domain token bucket, shared across every caller in the process.
///
/// `governor`'s keyed limiter applies one `Quota` to every key, which
/// can't express a per-domain override, so each domain gets its own
/// directly-constructed limiter instead, built lazily from whatever
/// quota `quotas` holds for it (or `default_quota` if none was set).
pub struct RateLimiter {
    limiters: RwLock<HashMap<String, Arc<DirectLimiter>>>,
    quotas: RwLock<HashMap<String, DomainQuota>>,
    default_quota: DomainQuota,
    backoff: BackoffPolicy,
    clock: DefaultClock,
}

impl RateLimiter {
    pub fn new(default_quota: DomainQuota, backoff: BackoffPolicy) -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            quotas: RwLock::new(HashMap::new()),
            default_quota,
            backoff,
            clock: DefaultClock::default(),
        }
    }

    /// Override the quota for a specific domain (first-seen policy: takes
    /// effect for future acquisitions, does not retroactively reset an
    /// already-tracked bucket's fill level).
    pub async fn set_domain_quota(&self, domain: impl Into<String>, quota: DomainQuota) {
        let domain = domain.into();
        self.quotas.write().await.insert(domain.clone(), quota);
        self.limiters.write().await.remove(&domain);
    }

    /// The limiter backing `domain`, creating one from its configured quota
    /// (override, else `default_quota`) the first time the domain is seen.
    async fn limiter_for(&self, domain: &str) -> Arc<DirectLimiter> {
        if let Some(limiter) = self.limiters.read().await.get(domain) {
            return limiter.clone();
        }
        let quota = self.quotas.read().await.get(domain).copied().unwrap_or(self.default_quota);
        let limiter = Arc::new(GovernorLimiter::direct(quota.to_governor_quota()));
        self.limiters.write().await.insert(domain.to_string(), limiter.clone());
        limiter
    }

    /// Acquire a slot for `domain`, waiting as long as necessary. An
    /// already-cancelled `cancel` future aborts the wait without consuming
    /// a token.
    pub async fn acquire(&self, domain: &str) -> CoreResult<()> {
        self.acquire_cancellable(domain, std::future::pending()).await
    }

    /// Like [`acquire`](Self::acquire), but resolves with
    /// `RateLimitError::Cancelled` if `cancel` completes first.
    pub async fn acquire_cancellable(
        &self,
        domain: &str,
        cancel: impl std::future::Future<Output = ()>,
    ) -> CoreResult<()> {
        let limiter = self.limiter_for(domain).await;
        let wait = async {
            loop {
                match limiter.check() {
                    Ok(()) => return,
                    Err(not_until) => {
                        let wait_time = not_until.wait_time_from(self.clock.now());
                        tokio::time::sleep(wait_time).await;
                    }
                }
            }
        };

        tokio::select! {
            _ = wait => Ok(()),
            _ = cancel => Err(RateLimitError::Cancelled { domain: domain.to_string() }.into()),
        }
    }

    /// Exponential-backoff-with-jitter delay to apply before a retry,
    /// per §4.2. Does not itself sleep; callers combine this with their
    /// own cancellation/deadline handling.
    pub fn backoff_delay(&self, attempt: u32, jitter_unit: f64) -> Duration {
        self.backoff.delay_for(attempt, jitter_unit)
    }

    pub fn default_quota(&self) -> DomainQuota {
        self.default_quota
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DomainQuota::default(), BackoffPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_grants_within_burst_immediately() {
        let limiter = RateLimiter::new(DomainQuota { per_minute: 60, burst: 3 }, BackoffPolicy::default());
        for _ in 0..3 {
            limiter.acquire("example.com").await.unwrap();
        }
    }

    #[tokio::test]
    async fn set_domain_quota_overrides_the_default_burst() {
        let limiter = RateLimiter::new(DomainQuota { per_minute: 60, burst: 1 }, BackoffPolicy::default());
        limiter.set_domain_quota("big.example.com", DomainQuota { per_minute: 60, burst: 5 }).await;
        for _ in 0..5 {
            limiter.acquire("big.example.com").await.unwrap();
        }
    }

    #[tokio::test]
    async fn acquire_is_independent_per_domain() {
        let limiter = RateLimiter::new(DomainQuota { per_minute: 60, burst: 1 }, BackoffPolicy::default());
        limiter.acquire("a.com").await.unwrap();
        limiter.acquire("b.com").await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_aborts_wait_without_error_panicking() {
        let limiter = RateLimiter::new(DomainQuota { per_minute: 1, burst: 1 }, BackoffPolicy::default());
        limiter.acquire("example.com").await.unwrap();

        let cancel = async { tokio::time::sleep(Duration::from_millis(5)).await };
        let result = limiter.acquire_cancellable("example.com", cancel).await;
        assert!(result.is_err());
    }

    #[test]
    fn backoff_delay_caps_at_max_and_respects_jitter_bound() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter_factor: 0.3,
        };
        let d0 = policy.delay_for(0, 0.0);
        assert_eq!(d0, Duration::from_millis(100));

        let d_large = policy.delay_for(10, 0.0);
        assert!(d_large <= Duration::from_secs(1) + Duration::from_millis(30));
    }
}
