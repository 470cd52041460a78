//! `BrowserDriver` — the full-headless-browser capability (C10).
//!
//! Deliberately out of scope per §1: "the core only sees a `BrowserDriver`
//! capability." This is the seam; a Playwright/Chromium-backed
//! implementation lives outside this workspace and is injected at
//! construction, the same way the teacher injects `Crawler`/`PageCache`
//! implementations behind its own traits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crawlkit_core::types::{ConsoleMessage, NetworkRequest, WebSocketConnection};

use crate::error::BrowseResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    pub wait_for: Option<WaitStrategy>,
    pub wait_for_selector: Option<String>,
    pub timeout: Option<Duration>,
    pub headers: HashMap<String, String>,
    pub capture_network: bool,
    pub capture_console: bool,
    pub capture_websockets: bool,
    pub fingerprint_seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct BrowserPageResult {
    pub html: String,
    pub final_url: String,
    pub network: Vec<NetworkRequest>,
    pub console: Vec<ConsoleMessage>,
    pub websockets: Vec<WebSocketConnection>,
    pub timing_ms: u64,
}

/// A per-profile browser context. Per §5: contexts are per-profile and
/// not concurrency-safe; callers serialize page operations within one.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn navigate(&self, url: &str, options: &BrowserOptions) -> BrowseResult<BrowserPageResult>;
    async fn evaluate(&self, script: &str) -> BrowseResult<serde_json::Value>;
    async fn close(&self) -> BrowseResult<()>;
}

/// The driver hands out contexts keyed by profile name; the same profile
/// always maps to the same context across calls (§5).
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn get_context(&self, profile: &str) -> BrowseResult<Box<dyn BrowserContext>>;
}

/// An injectable capability used by `VerificationEngine::check_url` to
/// re-fetch a page at the `intelligence` tier for a state re-check
/// (§4.11). Separate from `BrowserDriver` because state checks should
/// never require spinning up a full browser context.
#[async_trait]
pub trait StateVerificationBrowser: Send + Sync {
    async fn fetch_for_check(&self, url: &str) -> BrowseResult<String>;
}

/// Used by `VerificationEngine::check_api` (§4.11).
#[async_trait]
pub trait ApiCaller: Send + Sync {
    async fn call(&self, url: &str) -> BrowseResult<(u16, String)>;
}

/// Last-resort archive/cache lookup used by `ArchiveStrategy`, the pipeline's
/// final `archive:*` stage. Out of scope per §1 the same way `BrowserDriver`
/// is: a Wayback-Machine- or CDN-cache-backed implementation lives outside
/// this workspace and is injected at construction.
#[async_trait]
pub trait ArchiveLookup: Send + Sync {
    /// `Ok(Some(html))` on a hit, `Ok(None)` when the archive has nothing
    /// for `url` — never treated as an error by the caller.
    async fn lookup(&self, url: &str) -> BrowseResult<Option<String>>;
}

/// Default `ArchiveLookup`: no archive source configured, so every lookup
/// reports "nothing found" rather than failing the pipeline.
pub struct NoopArchive;

#[async_trait]
impl ArchiveLookup for NoopArchive {
    async fn lookup(&self, _url: &str) -> BrowseResult<Option<String>> {
        Ok(None)
    }
}
