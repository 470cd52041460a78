//! `SmartBrowserDeps` — the dependency container `SmartBrowser` is built
//! from. Every field is a process-wide singleton constructed once and
//! shared behind `Arc` (§5); `SmartBrowser::new` never constructs its own
//! collaborators.

use std::sync::Arc;

use crawlkit_core::{RateLimiter, ResponseCache};
use crawlkit_core::types::BrowseResult;
use crawlkit_intelligence::{ScriptSandbox, TieredFetcher, VerificationEngine};
use crawlkit_learning::{LearningEngine, ProceduralMemory};

use crate::embedder::Embedder;
use crate::paths::StateLayout;

pub struct SmartBrowserDeps<S: ScriptSandbox> {
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: Arc<ResponseCache<BrowseResult>>,
    pub learning: Arc<LearningEngine>,
    pub procedural_memory: Arc<ProceduralMemory>,
    pub embedder: Arc<dyn Embedder>,
    pub tiered_fetcher: Arc<TieredFetcher<S>>,
    pub verification: Arc<VerificationEngine>,
    pub layout: StateLayout,
}
