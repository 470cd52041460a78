use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("missing api key")]
    MissingApiKey,

    #[error("rate limited")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("request aborted")]
    RequestAborted,

    #[error("browse failed: {0}")]
    Browse(String),

    #[error("all fetch tiers exhausted")]
    TierExhausted,

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("schema validation failed: {0}")]
    SchemaValidationFailed(String),

    #[error(transparent)]
    Persistence(#[from] crawlkit_core::PersistenceError),

    #[error("required capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error(transparent)]
    Core(#[from] crawlkit_core::CoreError),

    #[error(transparent)]
    Learning(#[from] crawlkit_learning::LearningError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl BrowseError {
    /// Stable wire-format error code (§6.3).
    pub fn code(&self) -> &'static str {
        match self {
            BrowseError::InvalidUrl(_) => "INVALID_URL",
            BrowseError::MissingApiKey => "MISSING_API_KEY",
            BrowseError::RateLimited => "RATE_LIMITED",
            BrowseError::Timeout => "TIMEOUT",
            BrowseError::RequestAborted => "REQUEST_ABORTED",
            BrowseError::Browse(_) => "BROWSE_ERROR",
            BrowseError::TierExhausted => "TIER_EXHAUSTED",
            BrowseError::VerificationFailed(_) => "VERIFICATION_FAILED",
            BrowseError::SchemaValidationFailed(_) => "SCHEMA_VALIDATION_FAILED",
            BrowseError::Persistence(_) => "PERSISTENCE_ERROR",
            BrowseError::CapabilityUnavailable(_) => "CAPABILITY_UNAVAILABLE",
            BrowseError::Core(_) => "UNKNOWN_ERROR",
            BrowseError::Learning(_) => "UNKNOWN_ERROR",
            BrowseError::Http(_) => "BROWSE_ERROR",
        }
    }

    /// Whether a caller should retry with backoff (§7 propagation policy).
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrowseError::Timeout | BrowseError::RateLimited | BrowseError::Http(_))
    }
}

pub type BrowseResult<T> = std::result::Result<T, BrowseError>;
