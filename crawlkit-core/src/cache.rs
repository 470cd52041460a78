//! In-memory TTL+LRU response cache, and a `ContentCache` specialization
//! with change detection (§4.3).

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::host_matches_domain;

struct Entry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    /// Monotonically increasing access counter; lowest value is evicted
    /// first once the map is at capacity.
    last_touched: u64,
}

/// Normalize `(url, params)` into a single cache key: params URL-form
/// encoded with keys sorted lexicographically, per §4.3.
pub fn cache_key(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let mut sorted = params.to_vec();
    sorted.sort();
    let encoded: Vec<String> = sorted
        .into_iter()
        .map(|(k, v)| format!("{}={}", form_encode(&k), form_encode(&v)))
        .collect();
    format!("{url}?{}", encoded.join("&"))
}

fn form_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Generic in-memory map `key -> {value, insertedAt, expiresAt}` with TTL
/// expiry and LRU-style eviction at capacity.
pub struct ResponseCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    max_entries: usize,
    ttl: chrono::Duration,
    access_counter: std::sync::atomic::AtomicU64,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(max_entries: usize, ttl: chrono::Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            ttl,
            access_counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Utc::now();
        let mut entries = self.entries.write().unwrap();
        let remove = match entries.get(key) {
            Some(e) if e.expires_at <= now => true,
            _ => false,
        };
        if remove {
            entries.remove(key);
            return None;
        }
        let tick = self
            .access_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        entries.get_mut(key).map(|e| {
            e.last_touched = tick;
            e.value.clone()
        })
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        let now = Utc::now();
        let mut entries = self.entries.write().unwrap();
        if entries.len() >= self.max_entries {
            self.evict_oldest_tenth(&mut entries);
        }
        let tick = self
            .access_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        entries.insert(
            key.into(),
            Entry {
                value,
                inserted_at: now,
                expires_at: now + self.ttl,
                last_touched: tick,
            },
        );
    }

    /// Evict the oldest (least-recently-touched) 10% of entries, per §4.3.
    fn evict_oldest_tenth(&self, entries: &mut HashMap<String, Entry<V>>) {
        let evict_count = (entries.len() / 10).max(1);
        let mut keys: Vec<(String, u64)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.last_touched))
            .collect();
        keys.sort_by_key(|(_, touched)| *touched);
        for (key, _) in keys.into_iter().take(evict_count) {
            entries.remove(&key);
        }
    }

    /// Drop every expired entry.
    pub fn cleanup(&self) {
        let now = Utc::now();
        self.entries.write().unwrap().retain(|_, e| e.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, key: &str) {
        self.entries.write().unwrap().remove(key);
    }

    /// Remove every key whose URL prefix's host matches or is a subdomain
    /// of `domain` (§4.3 `clearDomain`).
    pub fn clear_domain(&self, domain: &str) {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|key, _| {
            let url_part = key.split('?').next().unwrap_or(key);
            match url::Url::parse(url_part) {
                Ok(u) => match u.host_str() {
                    Some(host) => !host_matches_domain(host, domain),
                    None => true,
                },
                Err(_) => true,
            }
        });
    }
}

/// Cached raw HTML content plus a change-detection hash (§4.3).
#[derive(Debug, Clone)]
pub struct ContentEntry {
    pub html: String,
    pub content_hash: String,
    pub fetched_at: DateTime<Utc>,
}

/// `ResponseCache` specialized for raw page content, with stable hashing
/// for change detection. The hash is advisory only — §4.3 is explicit that
/// it must never be treated as a uniqueness key elsewhere.
pub struct ContentCache {
    inner: ResponseCache<ContentEntry>,
}

impl ContentCache {
    pub fn new(max_entries: usize, ttl: chrono::Duration) -> Self {
        Self {
            inner: ResponseCache::new(max_entries, ttl),
        }
    }

    pub fn get(&self, url: &str) -> Option<ContentEntry> {
        self.inner.get(url)
    }

    pub fn set(&self, url: &str, html: &str) {
        let entry = ContentEntry {
            html: html.to_string(),
            content_hash: content_hash(html),
            fetched_at: Utc::now(),
        };
        self.inner.set(url, entry);
    }

    /// Recompute `new_html`'s hash and compare it to the stored entry's,
    /// if any.
    pub fn has_content_changed(&self, url: &str, new_html: &str) -> bool {
        match self.inner.get(url) {
            Some(entry) => entry.content_hash != content_hash(new_html),
            None => true,
        }
    }

    pub fn cleanup(&self) {
        self.inner.cleanup();
    }

    pub fn clear_domain(&self, domain: &str) {
        self.inner.clear_domain(domain);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Stable content hash, hex-encoded. SHA-256 rather than a literal 32-bit
/// rolling hash: same stability-across-runs guarantee §4.3 asks for, with
/// negligible collision risk, using a digest already in the dependency
/// stack.
fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_sorts_params() {
        let a = cache_key("https://example.com", &[("b".into(), "2".into()), ("a".into(), "1".into())]);
        let b = cache_key("https://example.com", &[("a".into(), "1".into()), ("b".into(), "2".into())]);
        assert_eq!(a, b);
    }

    #[test]
    fn get_returns_none_for_expired_entry() {
        let cache: ResponseCache<String> = ResponseCache::new(10, chrono::Duration::milliseconds(-1));
        cache.set("k", "v".to_string());
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn eviction_drops_oldest_tenth_at_capacity() {
        let cache: ResponseCache<u32> = ResponseCache::new(10, chrono::Duration::seconds(60));
        for i in 0..10 {
            cache.set(format!("k{i}"), i);
        }
        assert_eq!(cache.len(), 10);
        cache.set("k10", 10);
        assert!(cache.len() <= 10);
    }

    #[test]
    fn clear_domain_drops_matching_hosts_only() {
        let cache: ResponseCache<u32> = ResponseCache::new(10, chrono::Duration::seconds(60));
        cache.set("https://api.example.com/a", 1);
        cache.set("https://other.com/b", 2);
        cache.clear_domain("example.com");
        assert!(cache.get("https://api.example.com/a").is_none());
        assert!(cache.get("https://other.com/b").is_some());
    }

    #[test]
    fn content_cache_detects_changes() {
        let cache = ContentCache::new(10, chrono::Duration::seconds(60));
        cache.set("https://example.com", "<html>v1</html>");
        assert!(!cache.has_content_changed("https://example.com", "<html>v1</html>"));
        assert!(cache.has_content_changed("https://example.com", "<html>v2</html>"));
    }
}
