//! Temporal abstraction for cookies and cache headers.
//!
//! Absolute timestamps captured at record time are stored as millisecond
//! deltas from the capture instant, then turned back into absolute values
//! relative to the replay instant. A recording made months ago therefore
//! replays with cache headers and cookie expiries that are still coherent.

mod cookies;

pub use cookies::{
    abstract_cookies, abstract_cookies_at, reconstruct_cookies_header,
    reconstruct_cookies_header_at, AbstractCookie, CookieExpiry,
};

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DATE: &str = "date";
pub const EXPIRES: &str = "expires";
pub const LAST_MODIFIED: &str = "last-modified";

/// Formats seen in the wild for HTTP dates and cookie expiries.
const HTTP_DATE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S GMT",
    "%a, %d-%b-%y %H:%M:%S GMT",
    "%a, %d-%b-%Y %H:%M:%S GMT",
    "%A, %d-%b-%y %H:%M:%S GMT",
    "%a %b %e %H:%M:%S %Y",
];

/// Parse an HTTP date (RFC 1123, RFC 850, asctime or the Netscape cookie form).
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    HTTP_DATE_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    })
}

/// Format a timestamp as an IMF-fixdate.
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub(crate) fn delta_ms(value: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (value - now).num_milliseconds()
}

pub(crate) fn from_delta(now: DateTime<Utc>, delta_ms: i64) -> DateTime<Utc> {
    now + Duration::milliseconds(delta_ms)
}

/// Cache-related header timestamps expressed relative to capture time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_delta: Option<i64>,
}

impl CacheConfig {
    pub fn is_empty(&self) -> bool {
        self.date_delta.is_none()
            && self.expires_delta.is_none()
            && self.last_modified_delta.is_none()
    }

    /// Delta recorded for one of the cache headers.
    pub fn delta_for(&self, header: &str) -> Option<i64> {
        match header {
            DATE => self.date_delta,
            EXPIRES => self.expires_delta,
            LAST_MODIFIED => self.last_modified_delta,
            _ => None,
        }
    }
}

/// Capture `date`, `expires` and `last-modified` as deltas from now.
pub fn abstract_cache_config(headers: &BTreeMap<String, String>) -> CacheConfig {
    abstract_cache_config_at(headers, Utc::now())
}

pub fn abstract_cache_config_at(
    headers: &BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> CacheConfig {
    let delta_of = |name: &str| {
        headers
            .get(name)
            .and_then(|v| parse_http_date(v))
            .map(|at| delta_ms(at, now))
    };
    CacheConfig {
        date_delta: delta_of(DATE),
        expires_delta: delta_of(EXPIRES),
        last_modified_delta: delta_of(LAST_MODIFIED),
    }
}

/// Rewrite cache headers to `now + delta` for every captured delta.
pub fn apply_cache_config(headers: &mut BTreeMap<String, String>, config: &CacheConfig) {
    apply_cache_config_at(headers, config, Utc::now())
}

pub fn apply_cache_config_at(
    headers: &mut BTreeMap<String, String>,
    config: &CacheConfig,
    now: DateTime<Utc>,
) {
    for name in [DATE, EXPIRES, LAST_MODIFIED] {
        if let Some(delta) = config.delta_for(name) {
            headers.insert(name.to_string(), format_http_date(from_delta(now, delta)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_http_date_variants() {
        let expected = at("2020-02-19T20:42:39Z");
        assert_eq!(
            parse_http_date("Wed, 19 Feb 2020 20:42:39 GMT"),
            Some(expected)
        );
        assert_eq!(
            parse_http_date("Wed, 19-Feb-20 20:42:39 GMT"),
            Some(expected)
        );
        assert_eq!(
            parse_http_date("Wed, 19-Feb-2020 20:42:39 GMT"),
            Some(expected)
        );
        assert_eq!(
            parse_http_date("Wednesday, 19-Feb-20 20:42:39 GMT"),
            Some(expected)
        );
        assert_eq!(parse_http_date("Wed Feb 19 20:42:39 2020"), Some(expected));
        assert_eq!(parse_http_date("0"), None);
        assert_eq!(parse_http_date("-1"), None);
    }

    #[test]
    fn test_format_http_date() {
        assert_eq!(
            format_http_date(at("2020-02-19T20:42:39Z")),
            "Wed, 19 Feb 2020 20:42:39 GMT"
        );
    }

    #[test]
    fn test_cache_config_round_trip_shifts_to_replay_time() {
        let recorded_at = at("2020-02-19T20:00:00Z");
        let mut headers = BTreeMap::new();
        headers.insert(DATE.to_string(), "Wed, 19 Feb 2020 20:00:00 GMT".to_string());
        headers.insert(
            EXPIRES.to_string(),
            "Wed, 19 Feb 2020 21:00:00 GMT".to_string(),
        );
        headers.insert(
            LAST_MODIFIED.to_string(),
            "Tue, 18 Feb 2020 20:00:00 GMT".to_string(),
        );

        let config = abstract_cache_config_at(&headers, recorded_at);
        assert_eq!(config.date_delta, Some(0));
        assert_eq!(config.expires_delta, Some(3_600_000));
        assert_eq!(config.last_modified_delta, Some(-86_400_000));

        let replayed_at = at("2026-10-19T12:00:00Z");
        let mut replayed = BTreeMap::new();
        apply_cache_config_at(&mut replayed, &config, replayed_at);
        assert_eq!(replayed[DATE], "Mon, 19 Oct 2026 12:00:00 GMT");
        assert_eq!(replayed[EXPIRES], "Mon, 19 Oct 2026 13:00:00 GMT");
        assert_eq!(replayed[LAST_MODIFIED], "Sun, 18 Oct 2026 12:00:00 GMT");
    }

    #[test]
    fn test_unparseable_cache_headers_are_not_captured() {
        let mut headers = BTreeMap::new();
        headers.insert(EXPIRES.to_string(), "0".to_string());
        let config = abstract_cache_config_at(&headers, Utc::now());
        assert!(config.is_empty());

        let mut untouched = headers.clone();
        apply_cache_config_at(&mut untouched, &config, Utc::now());
        assert_eq!(untouched, headers);
    }
}
