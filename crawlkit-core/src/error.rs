//! Typed errors for the core crate.
//!
//! Uses `thiserror` (not `anyhow`) so downstream crates can match on
//! specific failure kinds rather than stringly-typed causes.

use thiserror::Error;

/// Errors surfaced by `PersistentStore`.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize value for {path}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("operation was cancelled")]
    Cancelled,
}

/// Errors surfaced by `RateLimiter`.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("acquisition for domain {domain} was cancelled before a token was granted")]
    Cancelled { domain: String },
}

/// Errors surfaced by `ContentExtractor`.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to parse base url: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
}

/// Catch-all for the rest of `crawlkit-core` (domain/cache bookkeeping).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
