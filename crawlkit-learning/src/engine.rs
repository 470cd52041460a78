//! `LearningEngine` — per-domain memory of patterns, selectors, validators,
//! and success/failure history (C6, §4.6).

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crawlkit_core::types::{
    ApiMethod, ApiPattern, ConfidenceLevel, ContentValidator, DomainGroup, FailureContext,
    NetworkRequest, PaginationPattern, Provenance, ProvenanceOrigin, SelectorChain,
    SelectorContentType, SuccessProfile, TemplateType, VerificationCheck,
};
use crawlkit_core::{domain_of, normalize_url};

/// §4.6.1 item 5: responses below this size are never considered API
/// candidates.
const MIN_CONTENT_SIZE: usize = 100;

/// §4.6.1: content confidence threshold for emitting a pattern.
const PATTERN_CONFIDENCE_THRESHOLD: f32 = 0.5;

const CONTENT_URL_PATTERNS: &[&str] = &[
    "/api/", "/v1/", "/v2/", "/v3/", "/graphql", "/feed", "/posts", "/articles", "/items",
    "/data", "/content",
];

const TRACKING_URL_MARKERS: &[&str] = &["/analytics", "/beacon", "/pixel", "/log"];

const DATA_PATH_KEYS: &[&str] = &[
    "data", "results", "items", "records", "entries", "content", "list", "rows", "hits",
    "documents", "objects", "posts", "articles", "products", "users", "comments", "messages",
    "notifications", "feed", "timeline",
];

const CONTENT_FIELD_NAMES: &[&str] = &[
    "title", "name", "description", "body", "text", "content", "html", "markdown", "summary",
    "excerpt", "image", "thumbnail", "url", "link", "price", "rating",
];

const VARIABLE_QUERY_KEYS: &[&str] = &[
    "timestamp", "ts", "t", "_", "rand", "random", "token", "auth", "session", "sid", "uid",
    "offset", "page", "limit", "cursor",
];

/// §4.6.3 decay configuration.
#[derive(Debug, Clone, Copy)]
pub struct DecayConfig {
    pub grace_period_days: i64,
    pub decay_rate_per_week: f32,
    pub min_confidence_threshold: f32,
    pub archive_after_days: i64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            grace_period_days: 7,
            decay_rate_per_week: 0.1,
            min_confidence_threshold: 0.3,
            archive_after_days: 90,
        }
    }
}

impl DecayConfig {
    /// `confidence * (1 - decayRatePerWeek) ^ age_weeks`, per §4.6.3.
    pub fn decay(&self, confidence: f32, last_success: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
        let age_days = (now - last_success).num_days().max(0) as f32;
        let age_weeks = (age_days / 7.0 - self.grace_period_days as f32 / 7.0).max(0.0);
        confidence * (1.0 - self.decay_rate_per_week).powf(age_weeks)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LearningStats {
    pub domains_tracked: usize,
    pub patterns_tracked: usize,
    pub selector_chains_tracked: usize,
}

/// One domain's full learned state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DomainKnowledge {
    profile: Option<SuccessProfile>,
    patterns: Vec<ApiPattern>,
    selector_chains: HashMap<SelectorContentType, SelectorChain>,
    validators: Vec<ContentValidator>,
    pagination: Option<PaginationPattern>,
}

pub struct LearningEngine {
    decay_config: DecayConfig,
    domains: RwLock<HashMap<String, DomainKnowledge>>,
    groups: RwLock<Vec<DomainGroup>>,
}

impl LearningEngine {
    pub fn new(decay_config: DecayConfig) -> Self {
        Self {
            decay_config,
            domains: RwLock::new(HashMap::new()),
            groups: RwLock::new(Vec::new()),
        }
    }

    fn with_domain_mut<R>(&self, domain: &str, f: impl FnOnce(&mut DomainKnowledge) -> R) -> R {
        let mut domains = self.domains.write().unwrap();
        let entry = domains.entry(domain.to_string()).or_default();
        f(entry)
    }

    pub fn get_success_profile(&self, domain: &str) -> Option<SuccessProfile> {
        self.domains.read().unwrap().get(domain).and_then(|d| d.profile.clone())
    }

    pub fn record_success(&self, domain: &str, strategy: impl Into<String>, confidence_delta: f32) {
        let strategy = strategy.into();
        tracing::info!(domain = %domain, strategy = %strategy, confidence_delta, "recorded strategy success");
        self.with_domain_mut(domain, |d| {
            let profile = d.profile.get_or_insert_with(|| {
                SuccessProfile::new(domain, Provenance::new(ProvenanceOrigin::LearnedPattern))
            });
            profile.record_success(strategy, confidence_delta);
        });
    }

    pub fn record_failure(&self, domain: &str, context: FailureContext) {
        tracing::warn!(domain = %domain, strategy = %context.attempted_strategy, reason = %context.reason, "recorded strategy failure");
        self.with_domain_mut(domain, |d| {
            let profile = d.profile.get_or_insert_with(|| {
                SuccessProfile::new(domain, Provenance::new(ProvenanceOrigin::LearnedPattern))
            });
            // FIFO capacity 50 (§4.6 recordFailure).
            if profile.recent_failures.len() >= 50 {
                profile.recent_failures.remove(0);
            }
            profile.record_failure(context);
        });
    }

    /// §4.6.1: discover candidate `ApiPattern`s from captured network
    /// traffic for one page load.
    pub fn discover_api_patterns(&self, domain: &str, requests: &[NetworkRequest]) -> Vec<ApiPattern> {
        let discovered: Vec<ApiPattern> = requests
            .iter()
            .filter(|r| qualifies_as_candidate(r))
            .filter_map(|r| build_pattern(domain, r))
            .collect();

        if !discovered.is_empty() {
            tracing::debug!(domain = %domain, discovered = discovered.len(), "discovered candidate api patterns");
            self.with_domain_mut(domain, |d| {
                for pattern in &discovered {
                    d.patterns.push(pattern.clone());
                }
            });
        }
        discovered
    }

    /// §4.6: `canBypass ∧ confidence ≥ 0.7`.
    pub fn get_bypassable_patterns(&self, domain: &str) -> Vec<ApiPattern> {
        self.domains
            .read()
            .unwrap()
            .get(domain)
            .map(|d| {
                d.patterns
                    .iter()
                    .filter(|p| p.can_bypass && self.decayed_confidence(p) >= 0.7)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn decayed_confidence(&self, pattern: &ApiPattern) -> f32 {
        match pattern.metrics.last_success_time {
            Some(t) => self.decay_config.decay(pattern.confidence, t, Utc::now()),
            None => pattern.confidence,
        }
    }

    /// URL-regex match + decayed-confidence ranking (§4.6).
    pub fn select_best_pattern(&self, domain: &str, url: &str) -> Option<ApiPattern> {
        let domains = self.domains.read().unwrap();
        let patterns = &domains.get(domain)?.patterns;
        patterns
            .iter()
            .filter(|p| !p.archived)
            .filter(|p| Regex::new(&p.url_pattern).ok().map(|re| re.is_match(url)).unwrap_or(false))
            .filter(|p| self.decayed_confidence(p) >= self.decay_config.min_confidence_threshold)
            .max_by(|a, b| self.decayed_confidence(a).partial_cmp(&self.decayed_confidence(b)).unwrap())
            .cloned()
    }

    pub fn get_selector_chain(&self, domain: &str, content_type: SelectorContentType) -> Vec<crawlkit_core::types::SelectorPattern> {
        self.domains
            .read()
            .unwrap()
            .get(domain)
            .and_then(|d| d.selector_chains.get(&content_type))
            .map(|chain| chain.ranked().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record_selector_outcome(&self, domain: &str, content_type: SelectorContentType, selector: &str, success: bool) {
        self.with_domain_mut(domain, |d| {
            let chain = d
                .selector_chains
                .entry(content_type)
                .or_insert_with(|| SelectorChain::new(domain, content_type));
            let entry = chain.selectors.iter_mut().find(|s| s.selector == selector);
            let entry = match entry {
                Some(e) => e,
                None => {
                    chain.selectors.push(crawlkit_core::types::SelectorPattern::new(selector));
                    chain.selectors.last_mut().unwrap()
                }
            };
            if success {
                entry.record_success();
            } else {
                entry.record_failure();
            }
        });
    }

    pub fn get_validators(&self, domain: &str) -> Vec<ContentValidator> {
        self.domains.read().unwrap().get(domain).map(|d| d.validators.clone()).unwrap_or_default()
    }

    pub fn add_validator(&self, domain: &str, validator: ContentValidator) {
        self.with_domain_mut(domain, |d| d.validators.push(validator));
    }

    pub fn get_pagination_pattern(&self, domain: &str) -> Option<PaginationPattern> {
        self.domains.read().unwrap().get(domain).and_then(|d| d.pagination.clone())
    }

    pub fn set_pagination_pattern(&self, domain: &str, pattern: PaginationPattern) {
        self.with_domain_mut(domain, |d| d.pagination = Some(pattern));
    }

    /// §4.6.4: register a domain as a member of a platform `DomainGroup`,
    /// seeding it with the group's shared patterns at confidence 0.5.
    pub fn join_domain_group(&self, domain: &str, group_id: &str, similarity: f32) {
        let mut groups = self.groups.write().unwrap();
        let Some(group) = groups.iter_mut().find(|g| g.id == group_id) else {
            return;
        };
        if group.contains(domain) {
            return;
        }
        group.add_member(domain, similarity);

        if let Some(rep_id) = &group.representative_pattern_id {
            let seed = self
                .domains
                .read()
                .unwrap()
                .values()
                .flat_map(|d| d.patterns.iter())
                .find(|p| &p.id == rep_id)
                .cloned();
            if let Some(mut seed) = seed {
                seed.id = format!("{}-{}", domain, seed.id);
                seed.domain = domain.to_string();
                seed.confidence = 0.5;
                seed.provenance = Provenance::new(ProvenanceOrigin::LearnedPattern).with_source_domain(domain);
                self.with_domain_mut(domain, |d| d.patterns.push(seed));
            }
        }
    }

    pub fn add_domain_group(&self, group: DomainGroup) {
        self.groups.write().unwrap().push(group);
    }

    /// §4.6.5: checks synthesized from learned state, confidence-filtered.
    pub fn get_learned_verifications(&self, domain: &str, min_confidence: f32) -> Vec<VerificationCheck> {
        use crawlkit_core::types::{CheckKind, CheckSeverity};

        let domains = self.domains.read().unwrap();
        let Some(knowledge) = domains.get(domain) else {
            return Vec::new();
        };

        knowledge
            .validators
            .iter()
            .filter(|v| v.weight() >= min_confidence && v.success_count >= 3)
            .map(|v| {
                VerificationCheck::passed(CheckKind::ContentValidator, CheckSeverity::Advisory)
                    .tap_detail(format!("validator for {}", v.domain))
            })
            .collect()
    }

    /// §4.6.3: periodic sweep — demote patterns under threshold, archive
    /// patterns unused for `archiveAfterDays`.
    pub fn decay(&self) {
        let now = Utc::now();
        let mut demoted = 0usize;
        let mut archived = 0usize;
        let mut domains = self.domains.write().unwrap();
        for knowledge in domains.values_mut() {
            for pattern in &mut knowledge.patterns {
                let Some(last_success) = pattern.metrics.last_success_time else {
                    continue;
                };
                let decayed = self.decay_config.decay(pattern.confidence, last_success, now);
                if decayed < self.decay_config.min_confidence_threshold {
                    pattern.can_bypass = false;
                    demoted += 1;
                }
                let unused_days = (now - last_success).num_days();
                if unused_days >= self.decay_config.archive_after_days {
                    pattern.archived = true;
                    archived += 1;
                }
            }
        }
        tracing::debug!(demoted, archived, "completed decay sweep");
    }

    pub fn get_stats(&self) -> LearningStats {
        let domains = self.domains.read().unwrap();
        LearningStats {
            domains_tracked: domains.len(),
            patterns_tracked: domains.values().map(|d| d.patterns.len()).sum(),
            selector_chains_tracked: domains.values().map(|d| d.selector_chains.len()).sum(),
        }
    }

    /// Serializable view used by `PersistentStore` to durably save/restore
    /// this engine's state (§6.2 `<learningEnginePath>`).
    pub fn snapshot(&self) -> LearningEngineSnapshot {
        LearningEngineSnapshot {
            domains: self.domains.read().unwrap().clone(),
            groups: self.groups.read().unwrap().clone(),
        }
    }

    pub fn restore(&self, snapshot: LearningEngineSnapshot) {
        *self.domains.write().unwrap() = snapshot.domains;
        *self.groups.write().unwrap() = snapshot.groups;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningEngineSnapshot {
    domains: HashMap<String, DomainKnowledge>,
    groups: Vec<DomainGroup>,
}

/// Extension used only to attach detail text to an already-built check
/// without LearningEngine reaching into `VerificationCheck`'s private
/// construction path.
trait TapDetail {
    fn tap_detail(self, detail: impl Into<String>) -> Self;
}

impl TapDetail for VerificationCheck {
    fn tap_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

fn qualifies_as_candidate(req: &NetworkRequest) -> bool {
    if !req.is_success() {
        return false;
    }
    if !req.is_json_content_type() {
        return false;
    }
    if !matches!(req.method, crawlkit_core::types::HttpMethod::Get | crawlkit_core::types::HttpMethod::Post) {
        return false;
    }
    if TRACKING_URL_MARKERS.iter().any(|m| req.url.contains(m)) {
        return false;
    }
    let body_len = req.response_body.as_ref().map(|b| b.len()).unwrap_or(0);
    body_len >= MIN_CONTENT_SIZE
}

/// §4.6.1 content-confidence scoring.
fn score_candidate(domain: &str, req: &NetworkRequest) -> (f32, Option<String>) {
    let mut score = 0.0f32;
    let mut data_path = None;

    if CONTENT_URL_PATTERNS.iter().any(|p| req.url.contains(p)) || req.url.ends_with(".json") {
        score += 0.2;
    }

    let body_len = req.response_body.as_ref().map(|b| b.len()).unwrap_or(0);
    if body_len >= MIN_CONTENT_SIZE {
        score += 0.1;
    }
    if body_len >= 1024 {
        score += 0.1;
    }
    if body_len >= 5 * 1024 {
        score += 0.1;
    }

    if let Some(body) = &req.response_body {
        if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
            if let Some(obj) = json.as_object() {
                for key in DATA_PATH_KEYS {
                    if let Some(value) = obj.get(*key) {
                        if value.is_array() || value.is_object() {
                            score += 0.3;
                            data_path = Some((*key).to_string());
                            break;
                        }
                    }
                }
            }

            let haystack = json.to_string().to_lowercase();
            let field_hits = CONTENT_FIELD_NAMES.iter().filter(|f| haystack.contains(**f)).count();
            score += (field_hits as f32 * 0.05).min(0.2);
        }
    }

    if req.duration_ms < 500 {
        score += 0.1;
    } else if req.duration_ms > 2000 {
        score -= 0.1;
    }

    if let Ok(url) = url::Url::parse(&req.url) {
        if domain_of(&url) == domain {
            score += 0.1;
        }
    }

    (score.clamp(0.0, 1.0), data_path)
}

fn build_pattern(domain: &str, req: &NetworkRequest) -> Option<ApiPattern> {
    let (confidence, _data_path) = score_candidate(domain, req);
    if confidence < PATTERN_CONFIDENCE_THRESHOLD {
        return None;
    }

    let url = url::Url::parse(&req.url).ok()?;
    let url_pattern = templatize_url(&url);
    let template_type = classify_template(domain, &url);
    let can_bypass = confidence >= 0.7;

    let method = match req.method {
        crawlkit_core::types::HttpMethod::Get => ApiMethod::Get,
        crawlkit_core::types::HttpMethod::Post => ApiMethod::Post,
        _ => ApiMethod::Get,
    };

    let mut pattern = ApiPattern::new(
        format!("{}-{:x}", domain, md5_like_hash(&req.url)),
        domain,
        normalize_url(&url),
        method,
        url_pattern,
        template_type,
        Provenance::new(ProvenanceOrigin::ApiExtraction)
            .with_source_domain(domain)
            .with_source_url(req.url.clone()),
    );
    pattern.confidence = confidence;
    pattern.can_bypass = can_bypass;
    Some(pattern)
}

/// Replace query params whose key matches the likely-variable list with
/// `[^/?#]+`, per §4.6.1; static params are preserved verbatim.
fn templatize_url(url: &url::Url) -> String {
    let mut out = format!("{}://{}{}", url.scheme(), url.host_str().unwrap_or(""), url.path());
    let pairs: Vec<(String, String)> = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
    if pairs.is_empty() {
        return regex::escape(&out);
    }
    let templated: Vec<String> = pairs
        .into_iter()
        .map(|(k, v)| {
            if VARIABLE_QUERY_KEYS.contains(&k.as_str()) {
                format!("{}=[^/?#]+", regex::escape(&k))
            } else {
                format!("{}={}", regex::escape(&k), regex::escape(&v))
            }
        })
        .collect();
    out = regex::escape(&out);
    format!("{out}\\?{}", templated.join("&"))
}

fn classify_template(domain: &str, url: &url::Url) -> TemplateType {
    let path = url.path();
    let known_registries = ["npmjs.com", "pypi.org", "rubygems.org"];

    if path.ends_with(".json") && known_registries.iter().any(|r| domain.contains(r)) {
        return TemplateType::RegistryLookup;
    }
    if domain.ends_with("firebaseio.com") && path.ends_with(".json") {
        return TemplateType::FirebaseRest;
    }
    if path.ends_with(".json") {
        return TemplateType::JsonSuffix;
    }
    if path.contains("graphql") || url.query_pairs().count() > 3 {
        return TemplateType::QueryApi;
    }
    let rest_re = Regex::new(r"^/api(/v\d+)?/[^/]+(/[^/]+)?$").unwrap();
    if rest_re.is_match(path) {
        return TemplateType::RestResource;
    }
    TemplateType::Custom
}

fn md5_like_hash(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlkit_core::types::HttpMethod;

    fn json_request(url: &str, body: &str, duration_ms: u64) -> NetworkRequest {
        NetworkRequest {
            url: url.to_string(),
            method: HttpMethod::Get,
            status: 200,
            content_type: Some("application/json".to_string()),
            request_headers: HashMap::new(),
            response_headers: HashMap::new(),
            response_body: Some(body.as_bytes().to_vec()),
            timestamp_start: Utc::now(),
            duration_ms,
        }
    }

    #[test]
    fn discover_api_patterns_emits_for_high_confidence_candidate() {
        let engine = LearningEngine::new(DecayConfig::default());
        let body = serde_json::json!({
            "data": [{"title": "Post 1", "description": "desc", "url": "x"}],
        })
        .to_string();
        let req = json_request("https://example.com/api/v2/posts?page=1&token=abc", &body, 200);

        let patterns = engine.discover_api_patterns("example.com", std::slice::from_ref(&req));
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].confidence >= PATTERN_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn discover_api_patterns_skips_tracking_and_small_bodies() {
        let engine = LearningEngine::new(DecayConfig::default());
        let tracking = json_request("https://example.com/analytics/beacon", "{}", 10);
        let tiny = json_request("https://example.com/api/data", "{}", 10);

        let patterns = engine.discover_api_patterns("example.com", &[tracking, tiny]);
        assert!(patterns.is_empty());
    }

    #[test]
    fn decay_config_applies_grace_period_then_weekly_rate() {
        let cfg = DecayConfig::default();
        let now = Utc::now();
        let recent = cfg.decay(0.8, now - chrono::Duration::days(3), now);
        assert_eq!(recent, 0.8);

        let old = cfg.decay(0.8, now - chrono::Duration::days(7 + 14), now);
        assert!(old < 0.8);
    }

    #[test]
    fn select_best_pattern_requires_regex_match() {
        let engine = LearningEngine::new(DecayConfig::default());
        let body = serde_json::json!({"data": [{"title": "x"}]}).to_string();
        let req = json_request("https://example.com/api/v2/posts", &body, 100);
        engine.discover_api_patterns("example.com", std::slice::from_ref(&req));

        let found = engine.select_best_pattern("example.com", "https://example.com/api/v2/posts");
        assert!(found.is_some());

        let not_found = engine.select_best_pattern("example.com", "https://example.com/totally/different");
        assert!(not_found.is_none());
    }

    #[test]
    fn record_success_and_failure_update_profile() {
        let engine = LearningEngine::new(DecayConfig::default());
        engine.record_success("example.com", "api:learned", 0.3);
        let profile = engine.get_success_profile("example.com").unwrap();
        assert_eq!(profile.consecutive_failures, 0);

        engine.record_failure("example.com", FailureContext::new("timeout", "parse:static"));
        let profile = engine.get_success_profile("example.com").unwrap();
        assert_eq!(profile.consecutive_failures, 1);
    }

    #[test]
    fn classify_template_recognizes_firebase_before_the_generic_json_suffix() {
        let url = url::Url::parse("https://hacker-news.firebaseio.com/v0/item/123.json").unwrap();
        assert_eq!(classify_template("hacker-news.firebaseio.com", &url), TemplateType::FirebaseRest);
    }

    #[test]
    fn classify_template_falls_back_to_json_suffix_off_firebase() {
        let url = url::Url::parse("https://example.com/api/item/123.json").unwrap();
        assert_eq!(classify_template("example.com", &url), TemplateType::JsonSuffix);
    }
}
