//! Canonicalization helpers used before hashing.

use super::key::QueryMap;
use hyper::header::CONTENT_TYPE;
use hyper::HeaderMap;
use serde_json::Value;
use url::Url;

/// Body placeholder for requests that claim JSON but don't parse.
pub const INVALID_JSON_BODY: &str = "<INVALID JSON>";

/// Serialize JSON with object keys sorted at every level.
pub fn stable_json(value: &Value) -> String {
    let mut out = String::new();
    write_stable(value, &mut out);
    out
}

fn write_stable(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a str never fails
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_stable(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_stable(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// Normalize a request body. JSON bodies are re-serialized with sorted keys so
/// formatting differences don't affect matching.
pub fn normalize_body(post_data: Option<&str>, headers: &HeaderMap) -> Option<String> {
    let data = post_data?;
    if data.is_empty() || !is_json_content_type(headers) {
        return Some(data.to_string());
    }
    match serde_json::from_str::<Value>(data) {
        Ok(parsed) => Some(stable_json(&parsed)),
        Err(_) => Some(INVALID_JSON_BODY.to_string()),
    }
}

/// Collect query parameters into a name-sorted map.
pub fn normalize_query(url: &Url) -> QueryMap {
    let mut query = QueryMap::new();
    for (name, value) in url.query_pairs() {
        query
            .entry(name.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    query
}
