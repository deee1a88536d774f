//! Header handling for recorded responses.
//!
//! Some response headers are meaningless or harmful to replay verbatim. They
//! are dropped from the stored header map and, where they carry information,
//! represented by dedicated fields (cookies, cache deltas).

use crate::temporal::CacheConfig;
use hyper::header::{
    HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, DATE, EXPIRES, LAST_MODIFIED,
    SET_COOKIE,
};
use hyper::HeaderMap;
use std::collections::BTreeMap;
use tracing::warn;

// Static header names with no constant in `hyper::header`
pub static STATUS: HeaderName = HeaderName::from_static("status");
pub static NEL: HeaderName = HeaderName::from_static("nel");
pub static REPORT_TO: HeaderName = HeaderName::from_static("report-to");

/// Headers never stored with a recording.
///
/// - `status` is kept as the response status instead
/// - `set-cookie` is stored as abstract cookies
/// - `content-encoding`/`content-length` are recomputed for the decoded body
/// - `nel`/`report-to` would report test traffic as network errors
pub fn is_always_dropped(name: &str) -> bool {
    [
        &STATUS,
        &SET_COOKIE,
        &CONTENT_ENCODING,
        &CONTENT_LENGTH,
        &NEL,
        &REPORT_TO,
    ]
    .into_iter()
    .any(|h| h.as_str().eq_ignore_ascii_case(name))
}

fn is_cache_timestamp(name: &str) -> bool {
    [&DATE, &EXPIRES, &LAST_MODIFIED]
        .into_iter()
        .any(|h| h.as_str().eq_ignore_ascii_case(name))
}

/// Filter live response headers for storage. Cache timestamps are dropped
/// only when `cache` captured them as deltas.
pub fn filter_headers_for_save(
    headers: &BTreeMap<String, String>,
    cache: &CacheConfig,
) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| {
            !is_always_dropped(name)
                && !(is_cache_timestamp(name) && cache.delta_for(name).is_some())
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Extension trait for building replay header maps from stored strings.
pub trait ReplayHeadersExt {
    /// Insert a header from strings. Returns false if either part is invalid.
    fn set_header_value(&mut self, name: &str, value: &str) -> bool;
}

impl ReplayHeadersExt for HeaderMap {
    fn set_header_value(&mut self, name: &str, value: &str) -> bool {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.insert(name, value);
                true
            }
            _ => false,
        }
    }
}

/// Convert stored headers into a `HeaderMap`, skipping invalid entries.
pub fn to_header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !map.set_header_value(name, value) {
            warn!("Skipping invalid recorded header {}: {:?}", name, value);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_headers() -> BTreeMap<String, String> {
        [
            ("content-type", "text/html"),
            ("content-length", "15"),
            ("content-encoding", "gzip"),
            ("set-cookie", "a=1"),
            ("date", "Wed, 19 Feb 2020 20:42:39 GMT"),
            ("expires", "0"),
            ("nel", "{}"),
            ("report-to", "{}"),
            ("x-custom", "kept"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_static_header_names() {
        assert_eq!(NEL.as_str(), "nel");
        assert_eq!(REPORT_TO.as_str(), "report-to");
    }

    #[test]
    fn test_filter_drops_replay_hostile_headers() {
        let cache = CacheConfig {
            date_delta: Some(0),
            ..Default::default()
        };
        let filtered = filter_headers_for_save(&live_headers(), &cache);
        let names: Vec<&str> = filtered.keys().map(String::as_str).collect();
        // `expires: 0` was not captured as a delta so it stays verbatim
        assert_eq!(names, vec!["content-type", "expires", "x-custom"]);
    }

    #[test]
    fn test_to_header_map_skips_invalid_values() {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        headers.insert("x-bad".to_string(), "line\nbreak".to_string());
        let map = to_header_map(&headers);
        assert_eq!(map.get("content-type").unwrap(), "text/html");
        assert!(map.get("x-bad").is_none());
    }

    #[test]
    fn test_set_header_value_invalid_name() {
        let mut map = HeaderMap::new();
        assert!(!map.set_header_value("bad name", "v"));
        assert!(map.set_header_value("x-ok", "v"));
    }
}
