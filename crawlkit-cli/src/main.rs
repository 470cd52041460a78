//! `crawlkit` command-line front end. Thin wrapper over `SmartBrowser`:
//! wires config, logging, and the default dependency set, then dispatches
//! to whichever subcommand was requested.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawlkit_browser::{BrowseOptions, Embedder, HashEmbedder, SmartBrowser, SmartBrowserDeps, StateLayout};
use crawlkit_core::{BackoffPolicy, CrawlkitConfig, RateLimiter, ResponseCache};
use crawlkit_intelligence::{
    ArchiveStrategy, FrameworkDataStrategy, LightweightRenderer, NoopArchive, NoopSandbox, SiteApiStrategy, StaticParseStrategy, Strategy,
    TieredFetcher, VerificationEngine,
};
use crawlkit_learning::{DecayConfig, LearningEngine, ProceduralMemory, ProceduralMemoryConfig};

#[derive(Parser)]
#[command(name = "crawlkit")]
#[command(about = "Intelligent web-content extraction")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and verify a URL through the full pipeline (§4.13).
    Browse {
        url: String,
        /// Print the extracted markdown instead of a summary.
        #[arg(long)]
        markdown: bool,
    },
    /// Run the tiered fetch alone, skipping verification and learning.
    Fetch { url: String },
    /// Show learning engine and cache statistics.
    Stats,
    /// Clear the response cache, optionally for one domain only.
    ClearCache {
        #[arg(long)]
        domain: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,crawlkit=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = CrawlkitConfig::from_env();
    let browser = build_browser(&config);
    browser.restore_state().await.context("failed to restore persisted learning state")?;

    match cli.command {
        Commands::Browse { url, markdown } => {
            let result = browser.browse(&url, &BrowseOptions::default()).await.context("browse failed")?;
            if markdown {
                println!("{}", result.content.markdown);
            } else {
                println!("title: {:?}", result.title);
                println!("tier: {:?}", result.metadata.tier);
                println!("verification passed: {}", result.passed_verification());
                println!("text length: {} bytes", result.content.text.len());
            }
        }
        Commands::Fetch { url } => {
            let result = browser.fetch(&url, &BrowseOptions::default()).await.context("fetch failed")?;
            println!("tier: {:?}", result.tier);
            println!("title: {:?}", result.title);
            println!("text length: {} bytes", result.text.len());
        }
        Commands::Stats => {
            let stats = browser.get_learning_stats();
            println!("domains tracked: {}", stats.domains_tracked);
            println!("patterns tracked: {}", stats.patterns_tracked);
            println!("selector chains tracked: {}", stats.selector_chains_tracked);
            println!("skills learned: {}", browser.get_procedural_memory_stats());
            println!("cache entries: {}", browser.get_cache_stats());
        }
        Commands::ClearCache { domain } => {
            browser.clear_cache(domain.as_deref());
            match domain {
                Some(d) => println!("cleared cache for {d}"),
                None => println!("cache has no entries addressed by domain; construct a fresh process to fully reset"),
            }
        }
    }

    Ok(())
}

fn build_browser(config: &CrawlkitConfig) -> SmartBrowser<NoopSandbox> {
    let http = reqwest::Client::new();
    let learning = Arc::new(LearningEngine::new(DecayConfig::default()));
    let procedural_memory = Arc::new(ProceduralMemory::new(ProceduralMemoryConfig::default(), 64));

    let strategies: Vec<Box<dyn Strategy>> = vec![
        Box::new(SiteApiStrategy::new(http.clone())),
        Box::new(FrameworkDataStrategy),
        Box::new(StaticParseStrategy::new(http.clone())),
        Box::new(ArchiveStrategy::new(Arc::new(NoopArchive), false)),
    ];
    let renderer = LightweightRenderer::new(http.clone(), NoopSandbox, 50);
    let tiered_fetcher = Arc::new(TieredFetcher::new(learning.clone(), strategies, renderer, None));
    let verification = Arc::new(VerificationEngine::new(learning.clone()));
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));

    let deps = SmartBrowserDeps {
        rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_quota.clone(), BackoffPolicy::default())),
        cache: Arc::new(ResponseCache::new(config.cache_max_entries, config.cache_ttl)),
        learning,
        procedural_memory,
        embedder,
        tiered_fetcher,
        verification,
        layout: StateLayout::from_env(),
    };
    SmartBrowser::new(deps)
}
