//! Set-Cookie abstraction.

use super::{delta_ms, format_http_date, from_delta, parse_http_date};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Expiry of a recorded cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CookieExpiry {
    /// Milliseconds between capture time and the original absolute expiry.
    #[serde(rename_all = "camelCase")]
    Delta { expires_delta: i64 },
    /// Expiry text that could not be parsed, replayed verbatim.
    Absolute { expires: String },
}

/// One cookie from a Set-Cookie header with its expiry made relative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbstractCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<CookieExpiry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    /// Attributes we don't model, kept as written.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_attributes: Vec<String>,
}

/// Split a newline-joined Set-Cookie value into abstract cookies.
pub fn abstract_cookies(raw: Option<&str>) -> Vec<AbstractCookie> {
    abstract_cookies_at(raw, Utc::now())
}

pub fn abstract_cookies_at(raw: Option<&str>, now: DateTime<Utc>) -> Vec<AbstractCookie> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    raw.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| parse_cookie(line, now))
        .collect()
}

fn parse_cookie(line: &str, now: DateTime<Utc>) -> AbstractCookie {
    let mut parts = line.split(';');
    let pair = parts.next().unwrap_or_default().trim();
    let (name, value) = match pair.split_once('=') {
        Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
        None => (String::new(), pair.to_string()),
    };

    let mut cookie = AbstractCookie {
        name,
        value,
        expiry: None,
        max_age: None,
        domain: None,
        path: None,
        secure: false,
        http_only: false,
        same_site: None,
        other_attributes: Vec::new(),
    };

    for attribute in parts.map(str::trim).filter(|a| !a.is_empty()) {
        let (key, val) = match attribute.split_once('=') {
            Some((key, val)) => (key.trim(), Some(val.trim())),
            None => (attribute, None),
        };
        match (key.to_ascii_lowercase().as_str(), val) {
            ("expires", Some(val)) => {
                cookie.expiry = Some(match parse_http_date(val) {
                    Some(at) => CookieExpiry::Delta {
                        expires_delta: delta_ms(at, now),
                    },
                    None => CookieExpiry::Absolute {
                        expires: val.to_string(),
                    },
                });
            }
            ("max-age", Some(val)) => cookie.max_age = Some(val.to_string()),
            ("domain", Some(val)) => cookie.domain = Some(val.to_string()),
            ("path", Some(val)) => cookie.path = Some(val.to_string()),
            ("samesite", Some(val)) => cookie.same_site = Some(val.to_string()),
            ("secure", _) => cookie.secure = true,
            ("httponly", _) => cookie.http_only = true,
            _ => cookie.other_attributes.push(attribute.to_string()),
        }
    }
    cookie
}

/// Serialize cookies into one comma-joined Set-Cookie value, recomputing
/// absolute expiries from now.
pub fn reconstruct_cookies_header(cookies: &[AbstractCookie]) -> String {
    reconstruct_cookies_header_at(cookies, Utc::now())
}

pub fn reconstruct_cookies_header_at(cookies: &[AbstractCookie], now: DateTime<Utc>) -> String {
    cookies
        .iter()
        .map(|cookie| serialize_cookie(cookie, now))
        .collect::<Vec<_>>()
        .join(", ")
}

fn serialize_cookie(cookie: &AbstractCookie, now: DateTime<Utc>) -> String {
    let mut out = if cookie.name.is_empty() {
        cookie.value.clone()
    } else {
        format!("{}={}", cookie.name, cookie.value)
    };
    match &cookie.expiry {
        Some(CookieExpiry::Delta { expires_delta }) => {
            out.push_str("; expires=");
            out.push_str(&format_http_date(from_delta(now, *expires_delta)));
        }
        Some(CookieExpiry::Absolute { expires }) => {
            out.push_str("; expires=");
            out.push_str(expires);
        }
        None => {}
    }
    if let Some(max_age) = &cookie.max_age {
        out.push_str(&format!("; max-age={max_age}"));
    }
    if let Some(domain) = &cookie.domain {
        out.push_str(&format!("; domain={domain}"));
    }
    if let Some(path) = &cookie.path {
        out.push_str(&format!("; path={path}"));
    }
    if cookie.secure {
        out.push_str("; secure");
    }
    if cookie.http_only {
        out.push_str("; httponly");
    }
    if let Some(same_site) = &cookie.same_site {
        out.push_str(&format!("; samesite={same_site}"));
    }
    for attribute in &cookie.other_attributes {
        out.push_str("; ");
        out.push_str(attribute);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI_COOKIE: &str = "__cfduid=d59f290664b58f3ddc256c03cb943d9d31580935359; expires=Fri, 06-Mar-20 20:42:39 GMT; path=/; domain=.homesick.com; HttpOnly; SameSite=Lax\ncart_currency=USD; path=/; expires=Wed, 19 Feb 2020 20:42:39 GMT\ncart_sig=; path=/; expires=Wed, 19 Feb 2020 20:42:39 GMT; HttpOnly\n_shopify_country=Canada; path=/\n_orig_referrer=; Expires=Wed, 19-Feb-20 20:42:39 GMT; Path=/; HttpOnly\n_shopify_y=d2a4f91d-bedb-441c-ad7b-e13fd1c0659e; path=/; expires=Sat, 05 Feb 2022 08:21:03 GMT\nsecure_customer_sig=; path=/; expires=Sun, 05 Feb 2040 20:42:39 GMT; secure; HttpOnly\n_landing_page=%2F; Expires=Wed, 19-Feb-20 20:42:39 GMT; Path=/; HttpOnly";

    fn captured_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2020-02-19T20:42:39Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_multi_cookie_header_is_split() {
        let cookies = abstract_cookies_at(Some(MULTI_COOKIE), captured_at());
        assert_eq!(cookies.len(), 8);

        let cfduid = &cookies[0];
        assert_eq!(cfduid.name, "__cfduid");
        assert_eq!(cfduid.domain.as_deref(), Some(".homesick.com"));
        assert!(cfduid.http_only);
        assert_eq!(cfduid.same_site.as_deref(), Some("Lax"));
        // Mar 6 is 16 days after Feb 19
        assert_eq!(
            cfduid.expiry,
            Some(CookieExpiry::Delta {
                expires_delta: 16 * 86_400_000
            })
        );

        assert_eq!(
            cookies[1].expiry,
            Some(CookieExpiry::Delta { expires_delta: 0 })
        );
        assert_eq!(cookies[2].value, "");
        assert!(cookies[3].expiry.is_none());
        assert!(cookies[6].secure);
    }

    #[test]
    fn test_missing_header_yields_no_cookies() {
        assert!(abstract_cookies(None).is_empty());
        assert!(abstract_cookies(Some("")).is_empty());
    }

    #[test]
    fn test_unparseable_expiry_kept_absolute() {
        let cookies = abstract_cookies(Some("a=1; expires=whenever"));
        assert_eq!(
            cookies[0].expiry,
            Some(CookieExpiry::Absolute {
                expires: "whenever".to_string()
            })
        );
        assert_eq!(
            reconstruct_cookies_header(&cookies),
            "a=1; expires=whenever"
        );
    }

    #[test]
    fn test_reconstruct_recomputes_expiry_from_now() {
        let cookies = abstract_cookies_at(
            Some("session=abc; expires=Thu, 20 Feb 2020 20:42:39 GMT; path=/; secure\nlang=en"),
            captured_at(),
        );
        let replay_at = DateTime::parse_from_rfc3339("2026-10-19T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let header = reconstruct_cookies_header_at(&cookies, replay_at);
        assert_eq!(
            header,
            "session=abc; expires=Tue, 20 Oct 2026 00:00:00 GMT; path=/; secure, lang=en"
        );
    }

    #[test]
    fn test_unknown_attributes_preserved() {
        let cookies = abstract_cookies(Some("id=7; Priority=High; Partitioned"));
        assert_eq!(
            cookies[0].other_attributes,
            vec!["Priority=High".to_string(), "Partitioned".to_string()]
        );
        assert_eq!(
            reconstruct_cookies_header(&cookies),
            "id=7; Priority=High; Partitioned"
        );
    }

    #[test]
    fn test_cookie_serde_uses_delta_tag() {
        let cookies = abstract_cookies_at(
            Some("a=1; expires=Wed, 19 Feb 2020 20:42:40 GMT"),
            captured_at(),
        );
        let json = serde_json::to_value(&cookies[0]).unwrap();
        assert_eq!(json["expiry"]["kind"], "delta");
        assert_eq!(json["expiry"]["expiresDelta"], 1000);
    }
}
