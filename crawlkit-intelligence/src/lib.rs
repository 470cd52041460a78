pub mod browser_driver;
pub mod content_intelligence;
pub mod error;
pub mod lightweight_renderer;
pub mod site_handlers;
pub mod tiered_fetcher;
pub mod verification;

pub use browser_driver::{
    ApiCaller, ArchiveLookup, BrowserContext, BrowserDriver, BrowserOptions, BrowserPageResult, NoopArchive, StateVerificationBrowser, WaitStrategy,
};
pub use content_intelligence::{
    run_pipeline, ArchiveStrategy, ContentResult, ContentResultMeta, ExtractOptions, FrameworkDataStrategy, LearnedApiStrategy, SiteApiStrategy,
    StaticParseStrategy, Strategy,
};
pub use error::{BrowseError, BrowseResult};
pub use lightweight_renderer::{Detection, LightweightRenderer, NoopSandbox, RenderOutcome, ScriptExecutionOutcome, ScriptSandbox};
pub use site_handlers::SiteApiHandler;
pub use tiered_fetcher::{TierBudgets, TieredFetchOptions, TieredFetchResult, TieredFetcher};
pub use verification::{
    CheckResult, Severity, UserCheck, VerificationEngine, VerificationInput, VerificationOutcome, VerifyMode, VerifyOptions,
};
