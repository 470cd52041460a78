//! Confidence scoring and provenance (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse confidence bucket, derived from a continuous score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    pub fn from_score(score: f32) -> Self {
        match score {
            s if s < 0.2 => ConfidenceLevel::VeryLow,
            s if s < 0.4 => ConfidenceLevel::Low,
            s if s < 0.6 => ConfidenceLevel::Medium,
            s if s < 0.8 => ConfidenceLevel::High,
            _ => ConfidenceLevel::VeryHigh,
        }
    }
}

/// Which signal produced a piece of content (title, field, pattern, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceOrigin {
    ApiExtraction,
    HtmlParse,
    FrameworkData,
    LearnedPattern,
    UserSupplied,
    ApiCall,
}

/// Attached to every learned artifact per §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub origin: ProvenanceOrigin,
    pub source_url: Option<String>,
    pub source_domain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub evidence: Option<String>,
}

impl Provenance {
    pub fn new(origin: ProvenanceOrigin) -> Self {
        Self {
            origin,
            source_url: None,
            source_domain: None,
            created_at: Utc::now(),
            evidence: None,
        }
    }

    pub fn with_source_domain(mut self, domain: impl Into<String>) -> Self {
        self.source_domain = Some(domain.into());
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

/// A score in [0,1] with a coarse level and the signal that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confidence {
    pub score: f32,
    pub level: ConfidenceLevel,
    pub source: String,
}

impl Confidence {
    pub fn new(score: f32, source: impl Into<String>) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            score,
            level: ConfidenceLevel::from_score(score),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_clamps_and_buckets() {
        let c = Confidence::new(1.4, "test");
        assert_eq!(c.score, 1.0);
        assert_eq!(c.level, ConfidenceLevel::VeryHigh);

        let c = Confidence::new(-0.1, "test");
        assert_eq!(c.score, 0.0);
        assert_eq!(c.level, ConfidenceLevel::VeryLow);
    }
}
