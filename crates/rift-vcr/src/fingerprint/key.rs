//! Match key types.

use crate::interceptor::ResourceType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Query parameters keyed by name. Values keep their order of appearance.
pub type QueryMap = BTreeMap<String, Vec<String>>;

/// Structured URL portion of a match key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UrlKey {
    /// Scheme including the trailing colon, e.g. `https:`.
    pub protocol: String,
    pub username: String,
    pub password: String,
    pub hostname: String,
    pub pathname: String,
    /// Empty when the scheme's default port is used.
    pub port: String,
    pub query: QueryMap,
}

/// Canonical fingerprint of an intercepted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchKey {
    pub method: String,
    pub url: UrlKey,
    pub body: Option<String>,
    pub is_navigation_request: bool,
    pub resource_type: ResourceType,
    /// Free-form fields for customization hooks.
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
    #[serde(default)]
    pub key_hash: String,
    #[serde(default)]
    pub key_count: u32,
}

impl MatchKey {
    /// Whether ordinal position can be relaxed when looking this key up.
    pub fn is_idempotent(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Human readable URL used in logs and errors.
    pub fn display_url(&self) -> String {
        let mut url = format!("{}//{}", self.url.protocol, self.url.hostname);
        if !self.url.port.is_empty() {
            url.push(':');
            url.push_str(&self.url.port);
        }
        url.push_str(&self.url.pathname);
        let query: Vec<String> = self
            .url
            .query
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| format!("{name}={v}")))
            .collect();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }
}
