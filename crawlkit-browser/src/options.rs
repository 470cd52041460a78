//! `BrowseOptions` — the recognized configuration surface (§6.4).

use std::collections::HashMap;
use std::time::Duration;

use crawlkit_core::types::FetchTier;
use crawlkit_intelligence::{VerifyMode, VerifyOptions, WaitStrategy};

#[derive(Debug, Clone)]
pub struct BrowseOptions {
    pub max_cost_tier: FetchTier,
    pub min_content_length: usize,
    pub timeout: Duration,
    pub wait_for: Option<WaitStrategy>,
    pub wait_for_selector: Option<String>,
    pub capture_network: bool,
    pub capture_console: bool,
    pub capture_websockets: bool,
    pub session_profile: Option<String>,
    pub use_rate_limiting: bool,
    pub retry_on_error: bool,
    pub max_retries: u32,
    pub use_skills: bool,
    pub record_trajectory: bool,
    pub enable_learning: bool,
    pub verify: VerifyOptions,
    pub force_strategy: Option<String>,
    pub fingerprint_seed: Option<u64>,
    pub headers: HashMap<String, String>,
}

impl Default for BrowseOptions {
    fn default() -> Self {
        Self {
            max_cost_tier: FetchTier::Playwright,
            min_content_length: 50,
            timeout: Duration::from_secs(30),
            wait_for: None,
            wait_for_selector: None,
            capture_network: true,
            capture_console: true,
            capture_websockets: true,
            session_profile: None,
            use_rate_limiting: true,
            retry_on_error: true,
            max_retries: 2,
            use_skills: false,
            record_trajectory: false,
            enable_learning: true,
            verify: VerifyOptions { mode: VerifyMode::Basic, ..Default::default() },
            force_strategy: None,
            fingerprint_seed: None,
            headers: HashMap::new(),
        }
    }
}
