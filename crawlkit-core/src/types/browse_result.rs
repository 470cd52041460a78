//! The top-level result type returned by `SmartBrowser::browse` (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::confidence::ConfidenceLevel;
use super::network::{ConsoleMessage, NetworkRequest};
use super::patterns::ApiPattern;
use super::verification::VerificationReport;
use super::websocket::WebSocketConnection;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub html: String,
    pub markdown: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedLink {
    pub href: String,
    pub text: String,
    pub rel: Option<String>,
}

/// Cost/capability tier a fetch was ultimately served from (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTier {
    Intelligence,
    Lightweight,
    Playwright,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseMetadata {
    pub load_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub language: Option<String>,
    pub from_cache: bool,
    pub retry_count: u32,
    pub tier: FetchTier,
    pub tiers_attempted: Vec<FetchTier>,
}

/// Which selectors the extractor tried, and which of those actually
/// produced content — fed back into `LearningEngine::record_success`
/// / `record_failure` (§4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningSummary {
    pub selectors_used: Vec<String>,
    pub selectors_succeeded: Vec<String>,
    pub selectors_failed: Vec<String>,
    pub confidence_level: Option<ConfidenceLevel>,
    pub trajectory_recorded: bool,
}

/// The full result of one `browse()` call (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseResult {
    pub url: String,
    pub final_url: String,
    pub title: Option<String>,
    pub content: ExtractedContent,
    pub tables: Vec<ExtractedTable>,
    pub links: Vec<ExtractedLink>,
    pub network: Vec<NetworkRequest>,
    pub console: Vec<ConsoleMessage>,
    pub discovered_apis: Vec<ApiPattern>,
    pub websockets: Vec<WebSocketConnection>,
    pub metadata: BrowseMetadata,
    pub learning: LearningSummary,
    pub verification: VerificationReport,
}

impl BrowseResult {
    pub fn passed_verification(&self) -> bool {
        self.verification.accepted()
    }
}
