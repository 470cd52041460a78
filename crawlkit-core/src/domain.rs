//! URL normalization and registrable-hostname ("domain") extraction.
//!
//! §3: "a URL is its normalized origin + path + sorted query string; a
//! domain is its registrable hostname (subdomain-aware matching where
//! noted)".
//!
//! This is a pragmatic suffix-aware splitter, not a full Public Suffix List
//! implementation — the teacher's dependency stack doesn't carry a `psl`
//! crate anywhere in the pack, and pulling one in only for this one helper
//! would be a scope decision worth flagging rather than a drive-by add.
//! See DESIGN.md.

use url::Url;

/// Two-part and longer suffixes we know are not registrable on their own
/// (co.uk, com.au, ...). Anything not in this list is treated as a normal
/// single-label TLD, which is correct for the overwhelming majority of
/// domains this crate will ever see.
const COMPOUND_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "co.jp", "co.nz", "com.au", "net.au",
    "org.au", "co.za", "com.br", "co.in",
];

/// Extract the registrable hostname from a full host (e.g.
/// `www.api.example.co.uk` -> `example.co.uk`).
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }

    for suffix in COMPOUND_SUFFIXES {
        let suffix_labels: Vec<&str> = suffix.split('.').collect();
        if labels.len() > suffix_labels.len()
            && labels[labels.len() - suffix_labels.len()..] == suffix_labels[..]
        {
            let start = labels.len() - suffix_labels.len() - 1;
            return labels[start..].join(".");
        }
    }

    labels[labels.len() - 2..].join(".")
}

/// True iff `host` equals `domain` or is a subdomain of it.
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_lowercase();
    let domain = domain.trim_end_matches('.').to_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Normalize a URL to origin + path + sorted query string, per §3.
///
/// Drops the fragment, lower-cases scheme/host, and sorts query params
/// lexicographically by key (ties broken by value) so that cache keys and
/// learned `urlPattern`s are stable regardless of incoming param order.
pub fn normalize_url(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let mut out = format!(
        "{}://{}",
        url.scheme(),
        url.host_str().unwrap_or("").to_lowercase()
    );
    if let Some(port) = url.port() {
        out.push_str(&format!(":{port}"));
    }
    out.push_str(url.path());

    if !pairs.is_empty() {
        out.push('?');
        let encoded: Vec<String> = pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", urlencoding_component(&k), urlencoding_component(&v)))
            .collect();
        out.push_str(&encoded.join("&"));
    }

    out
}

/// Extract the registrable domain for a URL, or an empty string if the URL
/// has no host (e.g. a `data:` URL).
pub fn domain_of(url: &Url) -> String {
    url.host_str().map(registrable_domain).unwrap_or_default()
}

fn urlencoding_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrable_domain_strips_subdomains() {
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("api.v2.example.com"), "example.com");
        assert_eq!(registrable_domain("example.com"), "example.com");
    }

    #[test]
    fn registrable_domain_handles_compound_suffixes() {
        assert_eq!(registrable_domain("www.bbc.co.uk"), "bbc.co.uk");
        assert_eq!(registrable_domain("bbc.co.uk"), "bbc.co.uk");
    }

    #[test]
    fn host_matches_domain_is_subdomain_aware() {
        assert!(host_matches_domain("api.example.com", "example.com"));
        assert!(host_matches_domain("example.com", "example.com"));
        assert!(!host_matches_domain("notexample.com", "example.com"));
    }

    #[test]
    fn normalize_url_sorts_query_params() {
        let a = Url::parse("https://Example.com/path?b=2&a=1").unwrap();
        let b = Url::parse("https://example.com/path?a=1&b=2").unwrap();
        assert_eq!(normalize_url(&a), normalize_url(&b));
    }

    #[test]
    fn normalize_url_drops_fragment() {
        let a = Url::parse("https://example.com/path#section").unwrap();
        assert_eq!(normalize_url(&a), "https://example.com/path");
    }
}
