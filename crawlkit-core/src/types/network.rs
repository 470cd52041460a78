//! Captured network/console traffic (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// One request/response pair observed during a fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRequest {
    pub url: String,
    pub method: HttpMethod,
    pub status: u16,
    pub content_type: Option<String>,
    pub request_headers: HashMap<String, String>,
    pub response_headers: HashMap<String, String>,
    pub response_body: Option<Vec<u8>>,
    pub timestamp_start: DateTime<Utc>,
    pub duration_ms: u64,
}

impl NetworkRequest {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Content-type families counted as JSON per §4.6.1 item 2.
    pub fn is_json_content_type(&self) -> bool {
        match &self.content_type {
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("application/json")
                    || ct.contains("application/ld+json")
                    || ct.contains("application/hal+json")
                    || ct.contains("application/vnd.api+json")
                    || ct.contains("text/json")
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub level: ConsoleLevel,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub source_location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: u16, content_type: Option<&str>) -> NetworkRequest {
        NetworkRequest {
            url: "https://example.com/api".to_string(),
            method: HttpMethod::Get,
            status,
            content_type: content_type.map(str::to_string),
            request_headers: HashMap::new(),
            response_headers: HashMap::new(),
            response_body: None,
            timestamp_start: Utc::now(),
            duration_ms: 10,
        }
    }

    #[test]
    fn is_success_checks_2xx_range() {
        assert!(sample(200, None).is_success());
        assert!(sample(299, None).is_success());
        assert!(!sample(300, None).is_success());
        assert!(!sample(404, None).is_success());
    }

    #[test]
    fn is_json_content_type_matches_known_families() {
        assert!(sample(200, Some("application/json; charset=utf-8")).is_json_content_type());
        assert!(sample(200, Some("application/ld+json")).is_json_content_type());
        assert!(!sample(200, Some("text/html")).is_json_content_type());
        assert!(!sample(200, None).is_json_content_type());
    }
}
