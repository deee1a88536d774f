//! Types persisted in cassette buckets.

use crate::error::{Result, VcrError};
use crate::fingerprint::MatchKey;
use crate::interceptor::{LiveResponse, ResourceType};
use crate::temporal::{AbstractCookie, CacheConfig};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Bucket schema version written by this crate.
pub const BUCKET_VERSION: u32 = 1;

/// How a recorded body is represented in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Utf8,
    Base64,
}

/// Response body with an explicit encoding tag so binary payloads round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedBody {
    pub encoding: BodyEncoding,
    pub data: String,
}

impl RecordedBody {
    /// Textual resources are stored as text when they are valid UTF-8,
    /// everything else as base64.
    pub fn encode(bytes: &[u8], resource_type: ResourceType) -> Self {
        if resource_type.is_textual() {
            if let Ok(text) = std::str::from_utf8(bytes) {
                return Self {
                    encoding: BodyEncoding::Utf8,
                    data: text.to_string(),
                };
            }
        }
        Self {
            encoding: BodyEncoding::Base64,
            data: STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Bytes> {
        match self.encoding {
            BodyEncoding::Utf8 => Ok(Bytes::from(self.data.clone().into_bytes())),
            BodyEncoding::Base64 => STANDARD
                .decode(&self.data)
                .map(Bytes::from)
                .map_err(|e| VcrError::CorruptBody(e.to_string())),
        }
    }
}

/// Recorded response from a live request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedResponse {
    pub status: u16,
    /// Filtered headers, see [`crate::headers::filter_headers_for_save`]
    pub headers: BTreeMap<String, String>,
    pub body: Option<RecordedBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// What happened to a request when it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecordedOutcome {
    /// The request failed at the network layer.
    #[serde(rename_all = "camelCase")]
    Abort { key: MatchKey, error_text: String },
    /// The request completed with a response.
    #[serde(rename_all = "camelCase")]
    Response {
        key: MatchKey,
        response: RecordedResponse,
        #[serde(default)]
        set_cookies: Vec<AbstractCookie>,
        #[serde(default)]
        cache_config: CacheConfig,
    },
}

impl RecordedOutcome {
    pub fn key(&self) -> &MatchKey {
        match self {
            RecordedOutcome::Abort { key, .. } => key,
            RecordedOutcome::Response { key, .. } => key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RecordedOutcome::Abort { .. } => "abort",
            RecordedOutcome::Response { .. } => "response",
        }
    }
}

/// Live result handed to [`super::Cassette::save`].
#[derive(Debug, Clone)]
pub enum RecordingResult {
    Success {
        response: LiveResponse,
        /// `None` when the response has no retrievable body.
        body: Option<Bytes>,
        latency: Duration,
    },
    Failure {
        error_text: String,
    },
}

/// On-disk unit of storage: every outcome sharing method, protocol, host and
/// path. Position in each list is `key_count - 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBucket {
    pub version: u32,
    #[serde(default)]
    pub outcomes: BTreeMap<String, Vec<Option<RecordedOutcome>>>,
}

impl Default for DataBucket {
    fn default() -> Self {
        Self {
            version: BUCKET_VERSION,
            outcomes: BTreeMap::new(),
        }
    }
}

impl DataBucket {
    /// Outcome at the exact occurrence slot.
    pub fn get(&self, hash: &str, key_count: u32) -> Option<&RecordedOutcome> {
        let index = (key_count as usize).checked_sub(1)?;
        self.outcomes.get(hash)?.get(index)?.as_ref()
    }

    /// First recorded outcome for a hash, regardless of position.
    pub fn first(&self, hash: &str) -> Option<&RecordedOutcome> {
        self.outcomes.get(hash)?.iter().flatten().next()
    }

    /// Store an outcome at its occurrence slot, padding earlier slots.
    pub fn set(&mut self, hash: &str, key_count: u32, outcome: RecordedOutcome) {
        let index = (key_count.max(1) - 1) as usize;
        let slots = self.outcomes.entry(hash.to_string()).or_default();
        if slots.len() <= index {
            slots.resize(index + 1, None);
        }
        slots[index] = Some(outcome);
    }

    /// Every stored outcome in hash order.
    pub fn iter(&self) -> impl Iterator<Item = &RecordedOutcome> {
        self.outcomes.values().flat_map(|slots| slots.iter().flatten())
    }

    pub fn outcome_count(&self) -> usize {
        self.iter().count()
    }
}
