//! Cassette storage for recorded outcomes.
//!
//! A cassette is a directory of JSON buckets, one per
//! `(method, protocol, host, path)`. Each bucket maps a key hash to the
//! outcomes recorded for every occurrence of that hash. Saves perform a full
//! read-modify-write of one bucket under a per-bucket lock, so writes to the
//! same bucket are serialized while different buckets are written in parallel.
//!
//! # Module Structure
//!
//! - `outcome` - Persisted types (outcomes, bodies, buckets)
//! - `diff` - Near-miss diagnostics

mod diff;
mod outcome;

pub use diff::{diff_keys, ClosestMatch, KeyDifference};
pub use outcome::{
    BodyEncoding, DataBucket, RecordedBody, RecordedOutcome, RecordedResponse, RecordingResult,
    BUCKET_VERSION,
};

use crate::error::{Result, VcrError};
use crate::fingerprint::MatchKey;
use crate::headers::filter_headers_for_save;
use crate::temporal::{abstract_cache_config_at, abstract_cookies_at};
use chrono::{DateTime, Utc};
use hyper::header::SET_COOKIE;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Longest file name most filesystems accept.
const MAX_FILENAME_BYTES: usize = 255;

/// Suffix of the temporary file a bucket is written through.
const BUCKET_TMP_SUFFIX: &str = ".json.tmp";

/// Longest sanitized stem, leaving room for the bucket suffixes.
pub const MAX_STEM_BYTES: usize = MAX_FILENAME_BYTES - BUCKET_TMP_SUFFIX.len();

/// Replace characters that are unsafe in file names with `_` and truncate to
/// [`MAX_STEM_BYTES`].
pub fn sanitize_filename(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if sanitized == "." || sanitized == ".." {
        sanitized = sanitized.replace('.', "_");
    }
    if sanitized.len() > MAX_STEM_BYTES {
        let mut end = MAX_STEM_BYTES;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized.truncate(end);
    }
    sanitized
}

/// Build the stored outcome for a live result captured at `now`.
pub fn outcome_from_result(
    key: &MatchKey,
    result: RecordingResult,
    now: DateTime<Utc>,
) -> RecordedOutcome {
    match result {
        RecordingResult::Failure { error_text } => RecordedOutcome::Abort {
            key: key.clone(),
            error_text,
        },
        RecordingResult::Success {
            response,
            body,
            latency,
        } => {
            let raw_headers = response.header_map();
            let cache_config = abstract_cache_config_at(&raw_headers, now);
            let set_cookies = abstract_cookies_at(
                raw_headers.get(SET_COOKIE.as_str()).map(String::as_str),
                now,
            );
            RecordedOutcome::Response {
                key: key.clone(),
                response: RecordedResponse {
                    status: response.status,
                    headers: filter_headers_for_save(&raw_headers, &cache_config),
                    body: body.map(|b| RecordedBody::encode(&b, key.resource_type)),
                    latency_ms: Some(latency.as_millis() as u64),
                },
                set_cookies,
                cache_config,
            }
        }
    }
}

/// Read a bucket file. A missing file is an empty bucket; a malformed one is
/// reported as corrupt.
pub async fn load_bucket(path: &Path) -> Result<DataBucket> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(DataBucket::default()),
        Err(e) => return Err(VcrError::io(path, e)),
    };
    let bucket: DataBucket =
        serde_json::from_str(&raw).map_err(|source| VcrError::CorruptBucket {
            path: path.to_path_buf(),
            source,
        })?;
    if bucket.version != BUCKET_VERSION {
        return Err(VcrError::UnsupportedBucketVersion {
            path: path.to_path_buf(),
            version: bucket.version,
        });
    }
    Ok(bucket)
}

/// Write a whole bucket through a temporary sibling file.
async fn write_bucket(path: &Path, bucket: &DataBucket) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| VcrError::io(parent, e))?;
    }
    let json = serde_json::to_string(bucket)?;
    let tmp = path.with_extension(&BUCKET_TMP_SUFFIX[1..]);
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| VcrError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| VcrError::io(path, e))
}

/// Recorded outcomes for one namespace, rooted at a directory.
pub struct Cassette {
    root: PathBuf,
    /// One lock per bucket path, created on first save
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl Cassette {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bucket file holding every outcome for the key's method, protocol,
    /// host and path.
    pub fn bucket_path(&self, key: &MatchKey) -> PathBuf {
        let name = sanitize_filename(&format!(
            "{}-{}{}{}",
            key.method, key.url.protocol, key.url.hostname, key.url.pathname
        ));
        self.root.join(format!("{name}.json"))
    }

    fn bucket_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Find the outcome recorded for this exact occurrence. GET requests fall
    /// back to any outcome recorded under the same hash.
    pub async fn lookup(&self, key: &MatchKey) -> Result<Option<RecordedOutcome>> {
        let bucket = load_bucket(&self.bucket_path(key)).await?;
        if let Some(outcome) = bucket.get(&key.key_hash, key.key_count) {
            return Ok(Some(outcome.clone()));
        }
        // Interceptors may coalesce duplicate idempotent requests in one run
        // but not another, so ordinal position is not reliable for GET
        if key.is_idempotent() {
            if let Some(outcome) = bucket.first(&key.key_hash) {
                debug!(
                    "Using first recording of {} for occurrence {}",
                    key.display_url(),
                    key.key_count
                );
                return Ok(Some(outcome.clone()));
            }
        }
        Ok(None)
    }

    /// Record a live result for a key.
    pub async fn save(&self, key: &MatchKey, result: RecordingResult) -> Result<()> {
        self.save_outcome(outcome_from_result(key, result, Utc::now()))
            .await
    }

    /// Store an outcome at its key's slot with an exclusive read-modify-write
    /// of the bucket.
    pub async fn save_outcome(&self, outcome: RecordedOutcome) -> Result<()> {
        let key = outcome.key();
        let path = self.bucket_path(key);
        let (hash, count) = (key.key_hash.clone(), key.key_count);

        let lock = self.bucket_lock(&path);
        let _guard = lock.lock().await;

        let mut bucket = load_bucket(&path).await?;
        bucket.set(&hash, count, outcome);
        write_bucket(&path, &bucket).await?;
        debug!(
            "Saved recording {}#{} to {:?} ({} outcomes)",
            hash,
            count,
            path,
            bucket.outcome_count()
        );
        Ok(())
    }

    /// Nearest outcome in the key's bucket, scored by the number of differing
    /// key fields. Only for diagnostics, never used to answer a request.
    pub async fn closest_match(&self, key: &MatchKey) -> Result<Option<ClosestMatch>> {
        let bucket = load_bucket(&self.bucket_path(key)).await?;
        let mut best: Option<ClosestMatch> = None;
        for outcome in bucket.iter() {
            let candidate = ClosestMatch {
                outcome: outcome.clone(),
                diff: diff_keys(outcome.key(), key)?,
            };
            if best.as_ref().is_none_or(|b| candidate.rank() < b.rank()) {
                best = Some(candidate);
            }
        }
        Ok(best)
    }

    /// Bucket files currently in the cassette, sorted by name.
    pub async fn bucket_paths(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(VcrError::io(&self.root, e)),
        };
        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VcrError::io(&self.root, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Load every bucket and collect the ones that fail. Buckets are read
    /// concurrently.
    pub async fn verify(&self) -> Result<VerifyReport> {
        let paths = self.bucket_paths().await?;
        let results = futures::future::join_all(paths.iter().map(|p| load_bucket(p))).await;
        let failures = paths
            .iter()
            .zip(results)
            .filter_map(|(path, result)| result.err().map(|e| (path.clone(), e)))
            .collect();
        Ok(VerifyReport {
            buckets: paths.len(),
            failures,
        })
    }
}

/// Outcome of [`Cassette::verify`].
#[derive(Debug)]
pub struct VerifyReport {
    pub buckets: usize,
    pub failures: Vec<(PathBuf, VcrError)>,
}

impl VerifyReport {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }
}
