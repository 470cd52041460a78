//! Learned patterns: `ApiPattern`, `SelectorChain`, `ContentValidator`,
//! `PaginationPattern` (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::confidence::Provenance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateType {
    JsonSuffix,
    RegistryLookup,
    RestResource,
    FirebaseRest,
    QueryApi,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Cookie,
    Bearer,
    Header,
    Session,
    None,
}

/// `successCount`/`failureCount`/timing rollup shared by patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_response_time_ms: f64,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_failure_time: Option<DateTime<Utc>>,
}

impl Default for PatternMetrics {
    fn default() -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            avg_response_time_ms: 0.0,
            last_success_time: None,
            last_failure_time: None,
        }
    }
}

impl PatternMetrics {
    /// Incorporate a new success sample, updating the running average.
    pub fn record_success(&mut self, response_time_ms: f64) {
        let n = self.success_count as f64;
        self.avg_response_time_ms = (self.avg_response_time_ms * n + response_time_ms) / (n + 1.0);
        self.success_count += 1;
        self.last_success_time = Some(Utc::now());
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Utc::now());
    }
}

/// sourcePath-in-response -> logical field.
pub type ContentMapping = HashMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternValidation {
    pub required_fields: Vec<String>,
    pub min_content_length: usize,
}

/// Canonical learned HTTP-API-behind-a-page (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPattern {
    pub id: String,
    pub domain: String,
    /// URL template with `{0},{1},...` placeholders.
    pub endpoint: String,
    pub method: ApiMethod,
    /// Regex binding target page URLs to variables.
    pub url_pattern: String,
    pub template_type: TemplateType,
    pub content_mappings: Vec<ContentMapping>,
    pub validation: PatternValidation,
    pub auth_type: Option<AuthType>,
    pub auth_headers: HashMap<String, crate::secret::SecretString>,
    pub confidence: f32,
    pub metrics: PatternMetrics,
    /// true iff the page content can be served by calling the endpoint
    /// directly, without rendering the page.
    pub can_bypass: bool,
    pub provenance: Provenance,
    pub archived: bool,
}

impl ApiPattern {
    pub fn new(
        id: impl Into<String>,
        domain: impl Into<String>,
        endpoint: impl Into<String>,
        method: ApiMethod,
        url_pattern: impl Into<String>,
        template_type: TemplateType,
        provenance: Provenance,
    ) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            endpoint: endpoint.into(),
            method,
            url_pattern: url_pattern.into(),
            template_type,
            content_mappings: Vec::new(),
            validation: PatternValidation {
                required_fields: Vec::new(),
                min_content_length: 0,
            },
            auth_type: None,
            auth_headers: HashMap::new(),
            confidence: 0.5,
            metrics: PatternMetrics::default(),
            can_bypass: false,
            provenance,
            archived: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SelectorContentType {
    MainContent,
    Requirements,
    Fees,
    Timeline,
    Documents,
    Contact,
    Navigation,
    Table,
}

/// One candidate selector within a `SelectorChain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorPattern {
    pub selector: String,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_worked: Option<DateTime<Utc>>,
    /// Derived ranking score; higher tries first. Incremented on success,
    /// decayed on failure (§3).
    pub priority: f32,
}

impl SelectorPattern {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            success_count: 0,
            failure_count: 0,
            last_worked: None,
            priority: 0.5,
        }
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.last_worked = Some(Utc::now());
        self.priority = (self.priority + 0.1).min(1.0);
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.priority = (self.priority - 0.15).max(0.0);
    }
}

/// A prioritized list of selectors for one `(domain, content_type)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorChain {
    pub domain: String,
    pub content_type: SelectorContentType,
    pub selectors: Vec<SelectorPattern>,
}

impl SelectorChain {
    pub fn new(domain: impl Into<String>, content_type: SelectorContentType) -> Self {
        Self {
            domain: domain.into(),
            content_type,
            selectors: Vec::new(),
        }
    }

    /// Selectors sorted by decayed priority, highest first.
    pub fn ranked(&self) -> Vec<&SelectorPattern> {
        let mut sorted: Vec<&SelectorPattern> = self.selectors.iter().collect();
        sorted.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap());
        sorted
    }
}

/// Per-domain content validation rules (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentValidator {
    pub domain: String,
    pub min_length: usize,
    pub max_length: Option<usize>,
    pub must_contain_any: Vec<String>,
    pub must_contain_all: Vec<String>,
    pub must_not_contain: Vec<String>,
    pub expected_language: Option<String>,
    pub success_count: u64,
    pub failure_count: u64,
}

impl ContentValidator {
    pub fn new(domain: impl Into<String>, min_length: usize) -> Self {
        Self {
            domain: domain.into(),
            min_length,
            max_length: None,
            must_contain_any: Vec::new(),
            must_contain_all: Vec::new(),
            must_not_contain: Vec::new(),
            expected_language: None,
            success_count: 0,
            failure_count: 0,
        }
    }

    /// `weight` drives how much this validator should be trusted relative
    /// to siblings (§3: "success/failure counters drive weight").
    pub fn weight(&self) -> f32 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            return 0.5;
        }
        self.success_count as f32 / total as f32
    }

    pub fn validate(&self, content: &str) -> bool {
        if content.len() < self.min_length {
            return false;
        }
        if let Some(max) = self.max_length {
            if content.len() > max {
                return false;
            }
        }
        if !self.must_contain_any.is_empty()
            && !self.must_contain_any.iter().any(|s| content.contains(s))
        {
            return false;
        }
        if !self.must_contain_all.iter().all(|s| content.contains(s)) {
            return false;
        }
        if self.must_not_contain.iter().any(|s| content.contains(s)) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationKind {
    QueryParam,
    PathSegment,
    InfiniteScroll,
    NextButton,
    LoadMore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationPattern {
    pub domain: String,
    pub kind: PaginationKind,
    pub param_name: Option<String>,
    pub increment: Option<i64>,
    pub selector: Option<String>,
    pub has_more_indicator: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_validator_checks_all_rules() {
        let mut v = ContentValidator::new("example.com", 10);
        v.must_contain_any = vec!["hello".into(), "hi".into()];
        v.must_not_contain = vec!["error".into()];

        assert!(v.validate("hello world, this is long enough"));
        assert!(!v.validate("short"));
        assert!(!v.validate("hello world but this has an error in it"));
        assert!(!v.validate("goodbye world, this is long enough"));
    }

    #[test]
    fn selector_priority_moves_with_outcomes() {
        let mut s = SelectorPattern::new(".main");
        let base = s.priority;
        s.record_success();
        assert!(s.priority > base);
        s.record_failure();
        s.record_failure();
        assert!(s.priority < base);
    }

    #[test]
    fn selector_chain_ranks_by_priority() {
        let mut chain = SelectorChain::new("example.com", SelectorContentType::MainContent);
        let mut low = SelectorPattern::new(".low");
        low.priority = 0.1;
        let mut high = SelectorPattern::new(".high");
        high.priority = 0.9;
        chain.selectors.push(low);
        chain.selectors.push(high);

        let ranked = chain.ranked();
        assert_eq!(ranked[0].selector, ".high");
    }
}
