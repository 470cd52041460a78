//! Domain types, persistence, rate limiting, caching, and content
//! extraction: the foundation every other crawlkit crate builds on.

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod persistence;
pub mod rate_limiter;
pub mod secret;
pub mod types;

pub use cache::{cache_key, ContentCache, ContentEntry, ResponseCache};
pub use config::CrawlkitConfig;
pub use domain::{domain_of, host_matches_domain, normalize_url, registrable_domain};
pub use error::{CoreError, CoreResult, ExtractError, PersistenceError, RateLimitError};
pub use extractor::{extract, ExtractionResult, TitleSource};
pub use persistence::{PersistenceStats, PersistenceStatsSnapshot, PersistentStore};
pub use rate_limiter::{BackoffPolicy, DomainQuota, RateLimiter};
pub use secret::SecretString;
