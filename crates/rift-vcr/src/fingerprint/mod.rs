//! Request fingerprinting.
//!
//! A [`MatchKey`] is derived from every intercepted request. Its `key_hash` is
//! a content hash over the canonicalized key, computed before the managed
//! fields (`key_hash`, `key_count`) are filled so record and replay runs of the
//! same traffic agree. `key_count` disambiguates repeats of the same hash in
//! the order the session sees them.
//!
//! # Module Structure
//!
//! - `key` - Match key types
//! - `normalize` - Body, query and JSON canonicalization

mod key;
mod normalize;

pub use key::{MatchKey, QueryMap, UrlKey};
pub use normalize::{normalize_body, normalize_query, stable_json, INVALID_JSON_BODY};

use crate::error::{Result, VcrError};
use crate::interceptor::InterceptedRequest;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Caller hook that rewrites a key before it is hashed.
pub type CustomizeKey = Arc<dyn Fn(MatchKey) -> MatchKey + Send + Sync>;

/// Hex digits of the SHA-256 digest kept in `key_hash`.
const KEY_HASH_LEN: usize = 16;

/// Derives match keys and tracks per-session occurrence counts.
pub struct Matcher {
    key_counts: Mutex<HashMap<String, u32>>,
    customize: Option<CustomizeKey>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Matcher {
    pub fn new(customize: Option<CustomizeKey>) -> Self {
        Self {
            key_counts: Mutex::new(HashMap::new()),
            customize,
        }
    }

    /// Compute the match key for a request and claim its occurrence slot.
    pub fn match_key(&self, request: &InterceptedRequest) -> Result<MatchKey> {
        let url = Url::parse(&request.url).map_err(|source| VcrError::InvalidUrl {
            url: request.url.clone(),
            source,
        })?;

        let key = MatchKey {
            method: request.method.to_uppercase(),
            url: UrlKey {
                protocol: format!("{}:", url.scheme()),
                username: url.username().to_string(),
                password: url.password().unwrap_or_default().to_string(),
                hostname: url.host_str().unwrap_or_default().to_string(),
                pathname: url.path().to_string(),
                port: url.port().map(|p| p.to_string()).unwrap_or_default(),
                query: normalize_query(&url),
            },
            body: normalize_body(request.post_data.as_deref(), &request.headers),
            is_navigation_request: request.is_navigation_request,
            resource_type: request.resource_type,
            extra: Default::default(),
            // Managed fields stay fixed until the hash is computed
            key_hash: String::new(),
            key_count: 0,
        };

        let mut key = match &self.customize {
            Some(customize) => validate_customized(customize(key))?,
            None => key,
        };
        key.key_hash = String::new();
        key.key_count = 0;

        key.key_hash = hash_key(&key)?;
        key.key_count = self.next_count(&key.key_hash);
        Ok(key)
    }

    fn next_count(&self, hash: &str) -> u32 {
        let mut counts = self.key_counts.lock();
        let count = counts.entry(hash.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Number of keys seen so far for a hash.
    pub fn seen(&self, hash: &str) -> u32 {
        self.key_counts.lock().get(hash).copied().unwrap_or(0)
    }
}

fn validate_customized(key: MatchKey) -> Result<MatchKey> {
    if key.method.trim().is_empty() {
        return Err(VcrError::InvalidMatchKey("method"));
    }
    if key.url.protocol.trim().is_empty() {
        return Err(VcrError::InvalidMatchKey("url.protocol"));
    }
    Ok(key)
}

/// Content hash over the stable serialization of a key.
pub fn hash_key(key: &MatchKey) -> Result<String> {
    let value = serde_json::to_value(key)?;
    let digest = Sha256::digest(stable_json(&value).as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(KEY_HASH_LEN);
    Ok(hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::ResourceType;
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use proptest::prelude::*;

    fn request(url: &str) -> InterceptedRequest {
        InterceptedRequest::get("1", url, "main")
    }

    #[test]
    fn test_url_parts_extracted() {
        let matcher = Matcher::default();
        let key = matcher
            .match_key(&request("https://user:pw@example.com:8443/a/b?x=1"))
            .unwrap();
        assert_eq!(key.method, "GET");
        assert_eq!(key.url.protocol, "https:");
        assert_eq!(key.url.username, "user");
        assert_eq!(key.url.password, "pw");
        assert_eq!(key.url.hostname, "example.com");
        assert_eq!(key.url.port, "8443");
        assert_eq!(key.url.pathname, "/a/b");
        assert_eq!(key.url.query["x"], vec!["1".to_string()]);
        assert_eq!(key.key_hash.len(), KEY_HASH_LEN);
    }

    #[test]
    fn test_default_port_is_empty() {
        let key = Matcher::default()
            .match_key(&request("https://example.com:443/"))
            .unwrap();
        assert_eq!(key.url.port, "");
    }

    #[test]
    fn test_key_counts_increment_per_hash() {
        let matcher = Matcher::default();
        let a1 = matcher.match_key(&request("https://example.com/a")).unwrap();
        let b1 = matcher.match_key(&request("https://example.com/b")).unwrap();
        let a2 = matcher.match_key(&request("https://example.com/a")).unwrap();
        assert_eq!(a1.key_count, 1);
        assert_eq!(b1.key_count, 1);
        assert_eq!(a2.key_count, 2);
        assert_eq!(a1.key_hash, a2.key_hash);
        assert_ne!(a1.key_hash, b1.key_hash);
        assert_eq!(matcher.seen(&a1.key_hash), 2);
    }

    #[test]
    fn test_counts_reset_with_new_matcher() {
        let first = Matcher::default();
        first.match_key(&request("https://example.com/")).unwrap();
        let second = Matcher::default();
        let key = second.match_key(&request("https://example.com/")).unwrap();
        assert_eq!(key.key_count, 1);
    }

    #[test]
    fn test_classification_affects_hash() {
        let matcher = Matcher::default();
        let plain = matcher.match_key(&request("https://example.com/")).unwrap();
        let mut nav = request("https://example.com/");
        nav.is_navigation_request = true;
        nav.resource_type = ResourceType::Document;
        let nav = matcher.match_key(&nav).unwrap();
        assert_ne!(plain.key_hash, nav.key_hash);
    }

    #[test]
    fn test_customize_strips_cache_buster() {
        let customize: CustomizeKey = Arc::new(|mut key: MatchKey| {
            key.url.query.remove("v");
            key
        });
        let matcher = Matcher::new(Some(customize));
        let a = matcher
            .match_key(&request("https://cdn.example.com/app.js?v=123"))
            .unwrap();
        let b = matcher
            .match_key(&request("https://cdn.example.com/app.js?v=456"))
            .unwrap();
        assert_eq!(a.key_hash, b.key_hash);
        assert_eq!(b.key_count, 2);
        assert!(a.url.query.is_empty());
    }

    #[test]
    fn test_customize_cannot_preset_managed_fields() {
        let customize: CustomizeKey = Arc::new(|mut key: MatchKey| {
            key.key_count = 99;
            key.key_hash = "forged".to_string();
            key
        });
        let key = Matcher::new(Some(customize))
            .match_key(&request("https://example.com/"))
            .unwrap();
        assert_eq!(key.key_count, 1);
        assert_ne!(key.key_hash, "forged");
    }

    #[test]
    fn test_customize_removing_method_is_rejected() {
        let customize: CustomizeKey = Arc::new(|mut key: MatchKey| {
            key.method.clear();
            key
        });
        let result = Matcher::new(Some(customize)).match_key(&request("https://example.com/"));
        assert!(matches!(result, Err(VcrError::InvalidMatchKey("method"))));
    }

    #[test]
    fn test_invalid_url_is_an_error() {
        let result = Matcher::default().match_key(&request("not a url"));
        assert!(matches!(result, Err(VcrError::InvalidUrl { .. })));
    }

    #[test]
    fn test_data_url_has_no_host() {
        let key = Matcher::default()
            .match_key(&request("data:text/plain,hello"))
            .unwrap();
        assert_eq!(key.url.protocol, "data:");
        assert_eq!(key.url.hostname, "");
    }

    proptest! {
        #[test]
        fn prop_query_order_does_not_change_hash(a in "[a-z]{1,6}", b in "[a-z]{1,6}", va in "[a-z0-9]{0,6}", vb in "[a-z0-9]{0,6}") {
            prop_assume!(a != b);
            let matcher = Matcher::default();
            let first = matcher
                .match_key(&request(&format!("https://example.com/p?{a}={va}&{b}={vb}")))
                .unwrap();
            let second = matcher
                .match_key(&request(&format!("https://example.com/p?{b}={vb}&{a}={va}")))
                .unwrap();
            prop_assert_eq!(first.key_hash, second.key_hash);
            prop_assert_eq!(second.key_count, 2);
        }

        #[test]
        fn prop_json_formatting_does_not_change_hash(x in 0i64..1000, y in "[a-z]{0,8}") {
            let matcher = Matcher::default();
            let mut compact = request("https://example.com/api");
            compact.method = "POST".to_string();
            compact.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            compact.post_data = Some(format!(r#"{{"x":{x},"y":"{y}"}}"#));
            let mut spaced = compact.clone();
            spaced.post_data = Some(format!(r#"{{ "y": "{y}", "x": {x} }}"#));
            let first = matcher.match_key(&compact).unwrap();
            let second = matcher.match_key(&spaced).unwrap();
            prop_assert_eq!(first.key_hash, second.key_hash);
        }

        #[test]
        fn prop_key_counts_strictly_increase(n in 1usize..20) {
            let matcher = Matcher::default();
            for expected in 1..=n {
                let key = matcher.match_key(&request("https://example.com/same")).unwrap();
                prop_assert_eq!(key.key_count as usize, expected);
            }
        }
    }
}
