//! Field-level diff between match keys, used for near-miss diagnostics.

use super::outcome::RecordedOutcome;
use crate::error::Result;
use crate::fingerprint::MatchKey;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Managed fields always differ between an unmatched key and any candidate.
const IGNORED_FIELDS: &[&str] = &["keyHash", "keyCount"];

/// One difference between a stored key and the key being looked up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum KeyDifference {
    /// Present on the requested key only.
    Added { path: String, value: Value },
    /// Present on the stored key only.
    Removed { path: String, value: Value },
    Changed {
        path: String,
        stored: Value,
        requested: Value,
    },
}

impl KeyDifference {
    /// Dotted path of the differing value, e.g. `url.query.page`.
    pub fn path(&self) -> &str {
        match self {
            KeyDifference::Added { path, .. }
            | KeyDifference::Removed { path, .. }
            | KeyDifference::Changed { path, .. } => path,
        }
    }

    /// Key field the difference belongs to, e.g. `url`.
    pub fn field(&self) -> &str {
        let path = self.path();
        path.split_once('.').map_or(path, |(field, _)| field)
    }
}

impl fmt::Display for KeyDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDifference::Added { path, value } => write!(f, "+ {path}: {value}"),
            KeyDifference::Removed { path, value } => write!(f, "- {path}: {value}"),
            KeyDifference::Changed {
                path,
                stored,
                requested,
            } => write!(f, "~ {path}: {stored} -> {requested}"),
        }
    }
}

/// Nearest recorded outcome for a key that had no exact match.
#[derive(Debug, Clone)]
pub struct ClosestMatch {
    pub outcome: RecordedOutcome,
    pub diff: Vec<KeyDifference>,
}

impl ClosestMatch {
    /// Number of top-level key fields that differ.
    pub fn score(&self) -> usize {
        differing_fields(&self.diff)
    }

    /// Ordering used to pick the nearest candidate: differing fields first,
    /// then leaf differences to break ties.
    pub fn rank(&self) -> (usize, usize) {
        (self.score(), self.diff.len())
    }
}

/// Count distinct top-level fields touched by a diff.
pub fn differing_fields(diff: &[KeyDifference]) -> usize {
    diff.iter()
        .map(KeyDifference::field)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Diff two keys field by field, descending into nested objects.
pub fn diff_keys(stored: &MatchKey, requested: &MatchKey) -> Result<Vec<KeyDifference>> {
    let mut stored = serde_json::to_value(stored)?;
    let mut requested = serde_json::to_value(requested)?;
    for value in [&mut stored, &mut requested] {
        if let Value::Object(map) = value {
            for field in IGNORED_FIELDS {
                map.remove(*field);
            }
        }
    }
    let mut differences = Vec::new();
    diff_values("", &stored, &requested, &mut differences);
    Ok(differences)
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

fn diff_values(path: &str, stored: &Value, requested: &Value, out: &mut Vec<KeyDifference>) {
    match (stored, requested) {
        (Value::Object(stored), Value::Object(requested)) => {
            for (field, stored_value) in stored {
                let child = join_path(path, field);
                match requested.get(field) {
                    Some(requested_value) => {
                        diff_values(&child, stored_value, requested_value, out)
                    }
                    None => out.push(KeyDifference::Removed {
                        path: child,
                        value: stored_value.clone(),
                    }),
                }
            }
            for (field, requested_value) in requested {
                if !stored.contains_key(field) {
                    out.push(KeyDifference::Added {
                        path: join_path(path, field),
                        value: requested_value.clone(),
                    });
                }
            }
        }
        (stored, requested) if stored != requested => out.push(KeyDifference::Changed {
            path: path.to_string(),
            stored: stored.clone(),
            requested: requested.clone(),
        }),
        _ => {}
    }
}
