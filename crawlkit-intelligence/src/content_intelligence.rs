//! `ContentIntelligence` — the zero-to-low-cost extraction strategy
//! pipeline (C8, §4.8).

use async_trait::async_trait;
use std::sync::Arc;

use crawlkit_core::types::ApiPattern;
use crawlkit_core::{extract, normalize_url};
use crawlkit_learning::LearningEngine;

use crate::browser_driver::ArchiveLookup;
use crate::error::{BrowseError, BrowseResult};
use crate::site_handlers::{self, SiteApiHandler};

#[derive(Debug, Clone, Default)]
pub struct ContentResultMeta {
    pub strategy: String,
    pub strategies_attempted: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ContentResult {
    pub text: String,
    pub markdown: String,
    pub title: Option<String>,
    pub structured_data: Option<serde_json::Value>,
    pub meta: ContentResultMeta,
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub min_content_length: usize,
    pub force_strategy: Option<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            min_content_length: 50,
            force_strategy: None,
        }
    }
}

/// One pipeline stage. `name()` must be stable — it is recorded verbatim
/// in `ContentResultMeta::strategies_attempted`.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;
    async fn attempt(&self, url: &str) -> BrowseResult<Option<ContentResult>>;
}

/// `api:learned` — run the domain's best learned `ApiPattern`.
pub struct LearnedApiStrategy {
    engine: Arc<LearningEngine>,
    domain: String,
    http: reqwest::Client,
}

impl LearnedApiStrategy {
    pub fn new(engine: Arc<LearningEngine>, domain: impl Into<String>, http: reqwest::Client) -> Self {
        Self { engine, domain: domain.into(), http }
    }
}

#[async_trait]
impl Strategy for LearnedApiStrategy {
    fn name(&self) -> &str {
        "api:learned"
    }

    async fn attempt(&self, url: &str) -> BrowseResult<Option<ContentResult>> {
        let Some(pattern) = self.engine.select_best_pattern(&self.domain, url) else {
            return Ok(None);
        };
        match call_pattern(&self.http, &pattern).await {
            Ok(Some(result)) => {
                self.engine.record_success(&self.domain, self.name(), 0.1);
                Ok(Some(result))
            }
            Ok(None) => {
                self.engine.record_failure(
                    &self.domain,
                    crawlkit_core::types::FailureContext::new("empty response", self.name()),
                );
                Ok(None)
            }
            Err(e) => {
                self.engine.record_failure(
                    &self.domain,
                    crawlkit_core::types::FailureContext::new(e.to_string(), self.name()),
                );
                Err(e)
            }
        }
    }
}

async fn call_pattern(http: &reqwest::Client, pattern: &ApiPattern) -> BrowseResult<Option<ContentResult>> {
    let response = http.get(&pattern.endpoint).send().await?;
    if !response.status().is_success() {
        return Ok(None);
    }
    let body: serde_json::Value = response.json().await?;
    let text = body.to_string();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(ContentResult {
        text,
        markdown: String::new(),
        title: None,
        structured_data: Some(body),
        meta: ContentResultMeta::default(),
    }))
}

/// `api:<site>` — built-in handlers for well-known JSON APIs (§4.8 item 2).
pub struct SiteApiStrategy {
    http: reqwest::Client,
}

impl SiteApiStrategy {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn handler_for(&self, url: &str) -> Option<Box<dyn SiteApiHandler>> {
        site_handlers::all().into_iter().find(|h| h.matches(url))
    }
}

#[async_trait]
impl Strategy for SiteApiStrategy {
    fn name(&self) -> &str {
        "api:site"
    }

    async fn attempt(&self, url: &str) -> BrowseResult<Option<ContentResult>> {
        let Some(handler) = self.handler_for(url) else {
            return Ok(None);
        };
        let api_url = handler.build_api_url(url);
        let response = self.http.get(&api_url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body: serde_json::Value = response.json().await?;
        Ok(Some(handler.extract(&body)))
    }
}

/// `framework:*` — extract embedded hydration data (§4.8 item 3).
pub struct FrameworkDataStrategy;

#[async_trait]
impl Strategy for FrameworkDataStrategy {
    fn name(&self) -> &str {
        "framework:hydration"
    }

    async fn attempt(&self, url: &str) -> BrowseResult<Option<ContentResult>> {
        let http = reqwest::Client::new();
        let html = http.get(url).send().await?.text().await?;
        Ok(extract_framework_data(&html))
    }
}

const HYDRATION_MARKERS: &[&str] = &["__NEXT_DATA__", "__NUXT__", "__INITIAL_STATE__"];

fn extract_framework_data(html: &str) -> Option<ContentResult> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("script").ok()?;

    for script in document.select(&selector) {
        let id = script.value().attr("id").unwrap_or("");
        let body: String = script.text().collect();

        if HYDRATION_MARKERS.contains(&id) {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
                return Some(ContentResult {
                    text: json.to_string(),
                    markdown: String::new(),
                    title: None,
                    structured_data: Some(json),
                    meta: ContentResultMeta::default(),
                });
            }
        }

        if script.value().attr("type") == Some("application/ld+json") {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
                return Some(ContentResult {
                    text: json.to_string(),
                    markdown: String::new(),
                    title: None,
                    structured_data: Some(json),
                    meta: ContentResultMeta::default(),
                });
            }
        }
    }

    for marker in HYDRATION_MARKERS {
        if let Some(idx) = html.find(&format!("window.{marker}")) {
            let rest = &html[idx..];
            if let Some(eq) = rest.find('=') {
                let json_start = &rest[eq + 1..];
                if let Some(end) = find_json_object_end(json_start) {
                    if let Ok(json) = serde_json::from_str::<serde_json::Value>(&json_start[..end]) {
                        return Some(ContentResult {
                            text: json.to_string(),
                            markdown: String::new(),
                            title: None,
                            structured_data: Some(json),
                            meta: ContentResultMeta::default(),
                        });
                    }
                }
            }
        }
    }

    None
}

fn find_json_object_end(s: &str) -> Option<usize> {
    let s = s.trim_start();
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// `parse:static` — plain GET + `ContentExtractor` (§4.8 item 4).
pub struct StaticParseStrategy {
    http: reqwest::Client,
}

impl StaticParseStrategy {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Strategy for StaticParseStrategy {
    fn name(&self) -> &str {
        "parse:static"
    }

    async fn attempt(&self, url: &str) -> BrowseResult<Option<ContentResult>> {
        let response = self.http.get(url).send().await?;
        let final_url = response.url().to_string();
        let html = response.text().await?;
        let extracted = extract(&html, &final_url)?;
        if extracted.text.is_empty() {
            return Ok(None);
        }
        Ok(Some(ContentResult {
            text: extracted.text,
            markdown: extracted.markdown,
            title: Some(extracted.title),
            structured_data: None,
            meta: ContentResultMeta::default(),
        }))
    }
}

/// `archive:*` — last-resort archive/cache lookup (§4.8 item 5), only
/// tried when every earlier strategy has already failed. Gated by
/// `enabled` since hitting an archive source is an opt-in, not a default:
/// the spec keeps it ordered last and conditional on "enabled and direct
/// fetch failed".
pub struct ArchiveStrategy {
    archive: Arc<dyn ArchiveLookup>,
    enabled: bool,
}

impl ArchiveStrategy {
    pub fn new(archive: Arc<dyn ArchiveLookup>, enabled: bool) -> Self {
        Self { archive, enabled }
    }
}

#[async_trait]
impl Strategy for ArchiveStrategy {
    fn name(&self) -> &str {
        "archive:*"
    }

    async fn attempt(&self, url: &str) -> BrowseResult<Option<ContentResult>> {
        if !self.enabled {
            return Ok(None);
        }
        let Some(html) = self.archive.lookup(url).await? else {
            return Ok(None);
        };
        let extracted = extract(&html, url)?;
        if extracted.text.is_empty() {
            return Ok(None);
        }
        Ok(Some(ContentResult {
            text: extracted.text,
            markdown: extracted.markdown,
            title: Some(extracted.title),
            structured_data: None,
            meta: ContentResultMeta::default(),
        }))
    }
}

/// Run strategies in order, first to satisfy `min_content_length` wins
/// (§4.8). `force_strategy` bypasses the pipeline entirely — empty/error
/// from that one strategy is a hard failure, no fallback.
pub async fn run_pipeline(strategies: &[Box<dyn Strategy>], url: &str, options: &ExtractOptions) -> BrowseResult<ContentResult> {
    let mut attempted = Vec::new();

    if let Some(forced) = &options.force_strategy {
        let strategy = strategies
            .iter()
            .find(|s| s.name() == forced)
            .ok_or_else(|| BrowseError::CapabilityUnavailable(forced.clone()))?;
        attempted.push(strategy.name().to_string());
        let mut result = strategy
            .attempt(url)
            .await?
            .ok_or_else(|| BrowseError::Browse(format!("forced strategy {forced} returned nothing")))?;
        result.meta.strategy = strategy.name().to_string();
        result.meta.strategies_attempted = attempted;
        return Ok(result);
    }

    for strategy in strategies {
        attempted.push(strategy.name().to_string());
        match strategy.attempt(url).await {
            Ok(Some(mut result)) if result.text.len() >= options.min_content_length => {
                tracing::debug!(url = %url, strategy = %strategy.name(), "strategy matched");
                result.meta.strategy = strategy.name().to_string();
                result.meta.strategies_attempted = attempted;
                return Ok(result);
            }
            Ok(_) => continue,
            Err(e) if e.is_retryable() => return Err(e),
            Err(_) => continue,
        }
    }

    tracing::debug!(url = %url, attempted = ?attempted, "no strategy matched");
    Err(BrowseError::TierExhausted)
}

/// `normalize_url` re-exported here purely so pattern-URL matching in
/// strategies shares the same canonicalization as caching (§4.3/§4.6).
pub fn canonical(url: &str) -> Option<String> {
    url::Url::parse(url).ok().map(|u| normalize_url(&u))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_data_finds_next_data_script() {
        let html = r#"<html><body><script id="__NEXT_DATA__">{"props":{"pageProps":{"title":"Hi"}}}</script></body></html>"#;
        let result = extract_framework_data(html).unwrap();
        assert!(result.text.contains("\"title\":\"Hi\""));
    }

    #[test]
    fn framework_data_finds_ld_json() {
        let html = r#"<html><body><script type="application/ld+json">{"@type":"Article","headline":"Post"}</script></body></html>"#;
        let result = extract_framework_data(html).unwrap();
        assert!(result.text.contains("headline"));
    }

    #[test]
    fn framework_data_returns_none_without_markers() {
        let html = "<html><body><p>plain</p></body></html>";
        assert!(extract_framework_data(html).is_none());
    }

    struct StubArchive(Option<&'static str>);

    #[async_trait]
    impl ArchiveLookup for StubArchive {
        async fn lookup(&self, _url: &str) -> BrowseResult<Option<String>> {
            Ok(self.0.map(str::to_string))
        }
    }

    #[tokio::test]
    async fn archive_strategy_is_a_no_op_when_disabled() {
        let strategy = ArchiveStrategy::new(Arc::new(StubArchive(Some("<html><body>archived content here</body></html>"))), false);
        assert!(strategy.attempt("https://example.com/gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn archive_strategy_extracts_from_a_hit_when_enabled() {
        let strategy = ArchiveStrategy::new(
            Arc::new(StubArchive(Some("<html><body><p>archived content, long enough to pass extraction</p></body></html>"))),
            true,
        );
        let result = strategy.attempt("https://example.com/gone").await.unwrap().unwrap();
        assert!(result.text.contains("archived content"));
    }

    #[tokio::test]
    async fn archive_strategy_returns_none_on_a_miss() {
        let strategy = ArchiveStrategy::new(Arc::new(StubArchive(None)), true);
        assert!(strategy.attempt("https://example.com/gone").await.unwrap().is_none());
    }
}
