//! Per-domain success/failure history (§3, grounds §4.6.3 decay and
//! §4.6.4 cross-domain generalization).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::confidence::Provenance;
use super::patterns::SelectorContentType;

/// Why an extraction attempt failed, retained so later attempts (or a
/// human) can see the pattern rather than just a boolean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    pub occurred_at: DateTime<Utc>,
    pub reason: String,
    pub attempted_strategy: String,
    pub content_type: Option<SelectorContentType>,
    pub http_status: Option<u16>,
}

impl FailureContext {
    pub fn new(reason: impl Into<String>, attempted_strategy: impl Into<String>) -> Self {
        Self {
            occurred_at: Utc::now(),
            reason: reason.into(),
            attempted_strategy: attempted_strategy.into(),
            content_type: None,
            http_status: None,
        }
    }
}

/// A single domain's learned track record: what has worked, what hasn't,
/// and how confident we currently are in each strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessProfile {
    pub domain: String,
    pub best_strategy: Option<String>,
    pub strategy_confidence: f32,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub recent_failures: Vec<FailureContext>,
    pub provenance: Provenance,
}

impl SuccessProfile {
    pub fn new(domain: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            domain: domain.into(),
            best_strategy: None,
            strategy_confidence: 0.0,
            last_success: None,
            consecutive_failures: 0,
            recent_failures: Vec::new(),
            provenance,
        }
    }

    /// §4.6.3: weekly decay rate applied outside a grace period.
    pub const DECAY_RATE_PER_WEEK: f32 = 0.1;
    /// §4.6.3: confidence is not decayed within this many days of the
    /// last observed success.
    pub const GRACE_PERIOD_DAYS: i64 = 7;

    pub fn record_success(&mut self, strategy: impl Into<String>, confidence_delta: f32) {
        self.best_strategy = Some(strategy.into());
        self.strategy_confidence = (self.strategy_confidence + confidence_delta).min(1.0);
        self.last_success = Some(Utc::now());
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, ctx: FailureContext) {
        self.consecutive_failures += 1;
        self.recent_failures.push(ctx);
        if self.recent_failures.len() > 20 {
            self.recent_failures.remove(0);
        }
        self.strategy_confidence = (self.strategy_confidence - 0.1).max(0.0);
    }

    /// Apply time-based decay, as of `now`, per §4.6.3's grace-period +
    /// weekly-rate formula.
    pub fn decayed_confidence(&self, now: DateTime<Utc>) -> f32 {
        let Some(last_success) = self.last_success else {
            return self.strategy_confidence;
        };
        let age_days = (now - last_success).num_days();
        if age_days <= Self::GRACE_PERIOD_DAYS {
            return self.strategy_confidence;
        }
        let decay_weeks = (age_days - Self::GRACE_PERIOD_DAYS) as f32 / 7.0;
        (self.strategy_confidence - decay_weeks * Self::DECAY_RATE_PER_WEEK).max(0.0)
    }
}

/// One domain's membership record within a `DomainGroup` (§4.6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEntry {
    pub domain: String,
    pub similarity: f32,
    pub joined_at: DateTime<Utc>,
}

/// A cluster of domains sharing platform fingerprints (e.g. all Shopify
/// storefronts), used to generalize a learned pattern across the group
/// instead of relearning it per domain (§4.6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainGroup {
    pub id: String,
    pub platform_signature: String,
    pub members: Vec<DomainEntry>,
    pub representative_pattern_id: Option<String>,
}

impl DomainGroup {
    pub fn new(id: impl Into<String>, platform_signature: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            platform_signature: platform_signature.into(),
            members: Vec::new(),
            representative_pattern_id: None,
        }
    }

    pub fn add_member(&mut self, domain: impl Into<String>, similarity: f32) {
        self.members.push(DomainEntry {
            domain: domain.into(),
            similarity,
            joined_at: Utc::now(),
        });
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.members.iter().any(|m| m.domain == domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::confidence::ProvenanceOrigin;
    use chrono::Duration;

    fn profile() -> SuccessProfile {
        SuccessProfile::new("example.com", Provenance::new(ProvenanceOrigin::LearnedPattern))
    }

    #[test]
    fn success_raises_confidence_and_resets_failures() {
        let mut p = profile();
        p.consecutive_failures = 3;
        p.record_success("api:learned", 0.3);
        assert_eq!(p.consecutive_failures, 0);
        assert!(p.strategy_confidence > 0.0);
        assert_eq!(p.best_strategy.as_deref(), Some("api:learned"));
    }

    #[test]
    fn decay_is_suppressed_within_grace_period() {
        let mut p = profile();
        p.record_success("api:learned", 0.8);
        let now = p.last_success.unwrap() + Duration::days(3);
        assert_eq!(p.decayed_confidence(now), p.strategy_confidence);
    }

    #[test]
    fn decay_applies_weekly_rate_past_grace_period() {
        let mut p = profile();
        p.record_success("api:learned", 0.8);
        let now = p.last_success.unwrap() + Duration::days(7 + 14);
        let decayed = p.decayed_confidence(now);
        assert!(decayed < p.strategy_confidence);
        let expected = (p.strategy_confidence - 2.0 * SuccessProfile::DECAY_RATE_PER_WEEK).max(0.0);
        assert!((decayed - expected).abs() < 1e-6);
    }

    #[test]
    fn domain_group_tracks_membership() {
        let mut g = DomainGroup::new("grp-1", "shopify");
        g.add_member("store-a.com", 0.95);
        assert!(g.contains("store-a.com"));
        assert!(!g.contains("store-b.com"));
    }
}
