//! Session envelope persisted per profile (§6.2). Cookies carry whatever
//! auth state a site issued, so they're wrapped the same way
//! `ApiPattern::auth_headers` is: redacted `Debug`/`Display`, plain-text
//! only across the `serde` boundary that writes them to disk.

use chrono::{DateTime, Utc};
use crawlkit_core::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Cookie,
    Bearer,
    Basic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEnvelope {
    pub domain: String,
    pub cookies: Vec<SecretString>,
    pub local_storage: HashMap<String, String>,
    pub session_storage: HashMap<String, String>,
    pub is_authenticated: bool,
    pub auth_type: Option<AuthType>,
    pub last_used: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub username: Option<String>,
}

impl SessionEnvelope {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            cookies: Vec::new(),
            local_storage: HashMap::new(),
            session_storage: HashMap::new(),
            is_authenticated: false,
            auth_type: None,
            last_used: Utc::now(),
            expires_at: None,
            username: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    pub fn touch(&mut self) {
        self.last_used = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_session_is_not_expired() {
        let session = SessionEnvelope::new("example.com");
        assert!(!session.is_expired(Utc::now()));
    }

    #[test]
    fn session_past_expiry_is_expired() {
        let mut session = SessionEnvelope::new("example.com");
        session.expires_at = Some(Utc::now() - Duration::hours(1));
        assert!(session.is_expired(Utc::now()));
    }
}
