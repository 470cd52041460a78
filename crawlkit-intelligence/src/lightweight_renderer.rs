//! `LightweightRenderer` (C9, §4.9): HTTP GET + DOM construction +
//! controlled JS execution, via an injected `ScriptSandbox` capability.
//!
//! No JS-sandbox crate exists anywhere in the dependency stack this
//! workspace draws from, so — same pattern as `BrowserDriver` — script
//! execution is modeled as an injectable capability rather than embedded
//! here. A real deployment wires in something like `deno_core` or `boa`;
//! this crate only needs the trait boundary.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::BrowseResult;

#[derive(Debug, Clone)]
pub struct ScriptExecutionOutcome {
    pub dom_after: String,
    pub scripts_executed: u32,
    pub scripts_skipped: u32,
    pub errors: Vec<String>,
}

/// Bounded-time, bounded-memory, no-network-fan-out JS execution over an
/// HTML document (§4.9).
#[async_trait]
pub trait ScriptSandbox: Send + Sync {
    async fn run(&self, html: &str, budget: Duration) -> BrowseResult<ScriptExecutionOutcome>;
}

/// A sandbox that performs no execution — every script is reported
/// skipped. Used when no real sandbox is configured; callers still get a
/// valid render with `jsExecuted=false` rather than an error.
pub struct NoopSandbox;

#[async_trait]
impl ScriptSandbox for NoopSandbox {
    async fn run(&self, html: &str, _budget: Duration) -> BrowseResult<ScriptExecutionOutcome> {
        let script_count = scraper::Html::parse_document(html)
            .select(&scraper::Selector::parse("script").unwrap())
            .count() as u32;
        Ok(ScriptExecutionOutcome {
            dom_after: html.to_string(),
            scripts_executed: 0,
            scripts_skipped: script_count,
            errors: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub needs_full_browser: bool,
    pub has_complex_js: bool,
    pub has_web_gl: bool,
    pub has_service_worker: bool,
}

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub html: String,
    pub final_url: String,
    pub js_executed: bool,
    pub scripts_executed: u32,
    pub scripts_skipped: u32,
    pub script_errors: Vec<String>,
    pub timing_ms: u64,
    pub detection: Detection,
}

const CHALLENGE_MARKERS: &[&str] = &["g-recaptcha", "cf-challenge", "cf_chl_opt", "__cf_chl_jschl"];

pub struct LightweightRenderer<S: ScriptSandbox> {
    http: reqwest::Client,
    sandbox: S,
    min_content_length: usize,
}

impl<S: ScriptSandbox> LightweightRenderer<S> {
    pub fn new(http: reqwest::Client, sandbox: S, min_content_length: usize) -> Self {
        Self { http, sandbox, min_content_length }
    }

    /// §4.9 contract. Network/parse/script-budget failures are reported in
    /// the outcome, never thrown — escalation is `TieredFetcher`'s call.
    pub async fn render(&self, url: &str, timeout: Duration) -> BrowseResult<RenderOutcome> {
        let started = std::time::Instant::now();
        let response = tokio::time::timeout(timeout, self.http.get(url).send())
            .await
            .map_err(|_| crate::error::BrowseError::Timeout)??;
        let final_url = response.url().to_string();
        let html = response.text().await?;

        let remaining = timeout.saturating_sub(started.elapsed());
        let outcome = self.sandbox.run(&html, remaining).await.unwrap_or(ScriptExecutionOutcome {
            dom_after: html.clone(),
            scripts_executed: 0,
            scripts_skipped: 0,
            errors: vec!["script sandbox failed".to_string()],
        });

        let detection = detect(&outcome.dom_after, self.min_content_length);

        Ok(RenderOutcome {
            html: outcome.dom_after,
            final_url,
            js_executed: outcome.scripts_executed > 0,
            scripts_executed: outcome.scripts_executed,
            scripts_skipped: outcome.scripts_skipped,
            script_errors: outcome.errors,
            timing_ms: started.elapsed().as_millis() as u64,
            detection,
        })
    }
}

fn detect(html: &str, min_content_length: usize) -> Detection {
    let lower = html.to_lowercase();
    let has_web_gl = lower.contains("webgl") || lower.contains("getcontext(\"webgl\"");
    let has_service_worker = lower.contains("serviceworker") || lower.contains("navigator.serviceworker");
    let has_challenge = CHALLENGE_MARKERS.iter().any(|m| lower.contains(m));
    let content_too_short = html.len() < min_content_length;
    let has_complex_js = lower.matches("<script").count() > 10;

    Detection {
        needs_full_browser: has_web_gl || has_service_worker || has_challenge || content_too_short,
        has_complex_js,
        has_web_gl,
        has_service_worker,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_sandbox_reports_scripts_as_skipped() {
        let html = "<html><body><script>1</script><script>2</script></body></html>";
        let outcome = NoopSandbox.run(html, Duration::from_millis(100)).await.unwrap();
        assert_eq!(outcome.scripts_skipped, 2);
        assert_eq!(outcome.scripts_executed, 0);
    }

    #[test]
    fn detection_flags_recaptcha_as_needing_full_browser() {
        let html = "<html><body><div class=\"g-recaptcha\"></div></body></html>";
        let detection = detect(html, 10);
        assert!(detection.needs_full_browser);
    }

    #[test]
    fn detection_flags_short_content() {
        let detection = detect("<html></html>", 1000);
        assert!(detection.needs_full_browser);
    }

    #[test]
    fn detection_passes_plain_content_page() {
        let html = format!("<html><body>{}</body></html>", "word ".repeat(200));
        let detection = detect(&html, 50);
        assert!(!detection.needs_full_browser);
    }
}
