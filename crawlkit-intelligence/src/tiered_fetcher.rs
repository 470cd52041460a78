//! `TieredFetcher` (C11, §4.10): escalates intelligence -> lightweight ->
//! playwright, stopping at the first tier whose result clears the bar.

use std::sync::Arc;
use std::time::Duration;

use crawlkit_core::types::{ConsoleMessage, FetchTier, NetworkRequest, WebSocketConnection};
use crawlkit_learning::LearningEngine;

use crate::browser_driver::{BrowserDriver, BrowserOptions};
use crate::content_intelligence::{self, ContentResult, ExtractOptions, Strategy};
use crate::error::{BrowseError, BrowseResult};
use crate::lightweight_renderer::{LightweightRenderer, ScriptSandbox};

/// Tier timeout budgets (§4.10): crossing one escalates, it never fails
/// the whole fetch outright.
#[derive(Debug, Clone, Copy)]
pub struct TierBudgets {
    pub intelligence: Duration,
    pub lightweight: Duration,
    pub playwright: Duration,
}

impl Default for TierBudgets {
    fn default() -> Self {
        Self {
            intelligence: Duration::from_secs(5),
            lightweight: Duration::from_secs(10),
            playwright: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TieredFetchOptions {
    pub min_content_length: usize,
    pub max_tier: FetchTier,
    pub budgets: TierBudgets,
    pub browser_profile: String,
    pub capture_network: bool,
    pub capture_console: bool,
    pub capture_websockets: bool,
}

impl Default for TieredFetchOptions {
    fn default() -> Self {
        Self {
            min_content_length: 50,
            max_tier: FetchTier::Playwright,
            budgets: TierBudgets::default(),
            browser_profile: "default".to_string(),
            capture_network: true,
            capture_console: true,
            capture_websockets: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TieredFetchResult {
    pub html: String,
    pub text: String,
    pub markdown: String,
    pub title: Option<String>,
    pub structured_data: Option<serde_json::Value>,
    pub tier: FetchTier,
    pub tiers_attempted: Vec<FetchTier>,
    pub fell_back: bool,
    pub timing_ms: u64,
    pub network: Vec<NetworkRequest>,
    pub console: Vec<ConsoleMessage>,
    pub websockets: Vec<WebSocketConnection>,
}

fn strategy_name_for(tier: FetchTier) -> &'static str {
    match tier {
        FetchTier::Intelligence => "tier:intelligence",
        FetchTier::Lightweight => "tier:lightweight",
        FetchTier::Playwright => "tier:playwright",
    }
}

/// Tiers above `FetchTier::Intelligence` in cost order, truncated to the
/// caller's `max_tier`.
fn tiers_to_try(max_tier: FetchTier) -> Vec<FetchTier> {
    [FetchTier::Intelligence, FetchTier::Lightweight, FetchTier::Playwright]
        .into_iter()
        .filter(|t| *t <= max_tier)
        .collect()
}

pub struct TieredFetcher<S: ScriptSandbox> {
    engine: Arc<LearningEngine>,
    strategies: Vec<Box<dyn Strategy>>,
    renderer: LightweightRenderer<S>,
    browser: Option<Arc<dyn BrowserDriver>>,
}

impl<S: ScriptSandbox> TieredFetcher<S> {
    pub fn new(
        engine: Arc<LearningEngine>,
        strategies: Vec<Box<dyn Strategy>>,
        renderer: LightweightRenderer<S>,
        browser: Option<Arc<dyn BrowserDriver>>,
    ) -> Self {
        Self { engine, strategies, renderer, browser }
    }

    /// §4.10: starts at the domain's preferred tier if a cost-tier-bypass
    /// pattern exists with confidence >= 0.7, otherwise starts at
    /// `Intelligence` and escalates on failure or under-length content.
    pub async fn fetch(&self, url: &str, domain: &str, options: &TieredFetchOptions) -> BrowseResult<TieredFetchResult> {
        let started = std::time::Instant::now();
        let start_tier = self.starting_tier(domain, options.max_tier);
        tracing::debug!(url = %url, domain = %domain, start_tier = ?start_tier, "starting tiered fetch");
        let mut attempted = Vec::new();
        let mut fell_back = false;

        for tier in tiers_to_try(options.max_tier) {
            if tier < start_tier {
                continue;
            }
            attempted.push(tier);

            let outcome = match tier {
                FetchTier::Intelligence => self.try_intelligence(url, options).await,
                FetchTier::Lightweight => self.try_lightweight(url, options).await,
                FetchTier::Playwright => self.try_playwright(url, options).await,
            };

            match outcome {
                Ok(Some(mut result)) => {
                    result.tiers_attempted = attempted.clone();
                    result.fell_back = fell_back;
                    result.timing_ms = started.elapsed().as_millis() as u64;
                    tracing::info!(url = %url, domain = %domain, tier = ?tier, fell_back, "tiered fetch succeeded");
                    self.engine.record_success(domain, strategy_name_for(tier), 0.1);
                    return Ok(result);
                }
                Ok(None) => {
                    fell_back = true;
                    tracing::debug!(url = %url, domain = %domain, tier = ?tier, "tier result below min_content_length, escalating");
                    self.engine.record_failure(
                        domain,
                        crawlkit_core::types::FailureContext::new("below min_content_length", strategy_name_for(tier)),
                    );
                    continue;
                }
                Err(e) if e.is_retryable() && tier != FetchTier::Playwright => {
                    fell_back = true;
                    tracing::debug!(url = %url, domain = %domain, tier = ?tier, error = %e, "tier failed, escalating");
                    self.engine.record_failure(
                        domain,
                        crawlkit_core::types::FailureContext::new(e.to_string(), strategy_name_for(tier)),
                    );
                    continue;
                }
                Err(e) => {
                    tracing::warn!(url = %url, domain = %domain, tier = ?tier, error = %e, "tiered fetch failed");
                    return Err(e);
                }
            }
        }

        tracing::warn!(url = %url, domain = %domain, "all tiers exhausted");
        Err(BrowseError::TierExhausted)
    }

    /// §4.6.4/§4.10: a learned pattern with `can_bypass=true` and
    /// confidence >= 0.7 jumps straight to `Intelligence`; otherwise start
    /// from the tier the domain's history prefers, never above `max_tier`.
    fn starting_tier(&self, domain: &str, max_tier: FetchTier) -> FetchTier {
        if !self.engine.get_bypassable_patterns(domain).is_empty() {
            return FetchTier::Intelligence;
        }
        let preferred = self
            .engine
            .get_success_profile(domain)
            .and_then(|p| p.best_strategy)
            .and_then(|s| s.strip_prefix("tier:").map(parse_tier))
            .flatten()
            .unwrap_or(FetchTier::Intelligence);
        preferred.min(max_tier)
    }

    async fn try_intelligence(&self, url: &str, options: &TieredFetchOptions) -> BrowseResult<Option<TieredFetchResult>> {
        let extract_options = ExtractOptions { min_content_length: options.min_content_length, force_strategy: None };
        let timeout = options.budgets.intelligence;
        let result = tokio::time::timeout(timeout, content_intelligence::run_pipeline(&self.strategies, url, &extract_options)).await;

        match result {
            Ok(Ok(content)) => Ok(Some(to_tier_result(content, FetchTier::Intelligence))),
            Ok(Err(BrowseError::TierExhausted)) => Ok(None),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    async fn try_lightweight(&self, url: &str, options: &TieredFetchOptions) -> BrowseResult<Option<TieredFetchResult>> {
        let outcome = self.renderer.render(url, options.budgets.lightweight).await?;
        if outcome.detection.needs_full_browser {
            return Ok(None);
        }
        let extracted = crawlkit_core::extract(&outcome.html, &outcome.final_url)?;
        if extracted.text.len() < options.min_content_length {
            return Ok(None);
        }
        Ok(Some(TieredFetchResult {
            html: outcome.html,
            text: extracted.text,
            markdown: extracted.markdown,
            title: Some(extracted.title),
            structured_data: None,
            tier: FetchTier::Lightweight,
            tiers_attempted: vec![],
            fell_back: false,
            timing_ms: outcome.timing_ms,
            network: vec![],
            console: vec![],
            websockets: vec![],
        }))
    }

    async fn try_playwright(&self, url: &str, options: &TieredFetchOptions) -> BrowseResult<Option<TieredFetchResult>> {
        let Some(driver) = &self.browser else {
            return Err(BrowseError::CapabilityUnavailable("BrowserDriver".to_string()));
        };
        let context = driver.get_context(&options.browser_profile).await?;
        let browser_options = BrowserOptions {
            timeout: Some(options.budgets.playwright),
            capture_network: options.capture_network,
            capture_console: options.capture_console,
            capture_websockets: options.capture_websockets,
            ..Default::default()
        };
        let page = tokio::time::timeout(options.budgets.playwright, context.navigate(url, &browser_options))
            .await
            .map_err(|_| BrowseError::Timeout)??;

        let extracted = crawlkit_core::extract(&page.html, &page.final_url)?;
        if extracted.text.len() < options.min_content_length {
            return Ok(None);
        }
        Ok(Some(TieredFetchResult {
            html: page.html,
            text: extracted.text,
            markdown: extracted.markdown,
            title: Some(extracted.title),
            structured_data: None,
            tier: FetchTier::Playwright,
            tiers_attempted: vec![],
            fell_back: false,
            timing_ms: page.timing_ms,
            network: page.network,
            console: page.console,
            websockets: page.websockets,
        }))
    }
}

fn parse_tier(s: &str) -> Option<FetchTier> {
    match s {
        "intelligence" => Some(FetchTier::Intelligence),
        "lightweight" => Some(FetchTier::Lightweight),
        "playwright" => Some(FetchTier::Playwright),
        _ => None,
    }
}

fn to_tier_result(content: ContentResult, tier: FetchTier) -> TieredFetchResult {
    TieredFetchResult {
        html: String::new(),
        text: content.text,
        markdown: content.markdown,
        title: content.title,
        structured_data: content.structured_data,
        tier,
        tiers_attempted: vec![],
        fell_back: false,
        timing_ms: 0,
        network: vec![],
        console: vec![],
        websockets: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_to_try_respects_max_tier() {
        assert_eq!(tiers_to_try(FetchTier::Lightweight), vec![FetchTier::Intelligence, FetchTier::Lightweight]);
        assert_eq!(tiers_to_try(FetchTier::Intelligence), vec![FetchTier::Intelligence]);
    }

    #[test]
    fn parse_tier_round_trips_strategy_names() {
        assert_eq!(parse_tier("lightweight"), Some(FetchTier::Lightweight));
        assert_eq!(parse_tier("bogus"), None);
    }
}
