//! Error types shared by the fingerprint engine, the cassette and the session.

use std::path::PathBuf;

/// Errors raised while recording or replaying traffic.
#[derive(Debug, thiserror::Error)]
pub enum VcrError {
    #[error("Invalid request URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Match key customization removed required field '{0}'")]
    InvalidMatchKey(&'static str),
    #[error("Unmatched {method} request to {url} (occurrence {key_count}) has no recording in the cassette")]
    UnmatchedRequest {
        method: String,
        url: String,
        key_count: u32,
    },
    #[error("Cassette bucket {path:?} is corrupt: {source}")]
    CorruptBucket {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Cassette bucket {path:?} has unsupported version {version}")]
    UnsupportedBucketVersion { path: PathBuf, version: u32 },
    #[error("Cassette I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Recorded body could not be decoded: {0}")]
    CorruptBody(String),
    #[error("Failed to serialize cassette data: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Interceptor error: {0}")]
    Interceptor(#[from] InterceptError),
    #[error("Timed out saving recording for {0}")]
    SaveTimedOut(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Background task failed: {0}")]
    Task(String),
}

impl VcrError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VcrError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure reported by the interception layer.
///
/// The message text is kept verbatim because some failures (bodies evicted by
/// a navigation) are recognised by their wording.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct InterceptError {
    pub message: String,
}

impl InterceptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type Result<T, E = VcrError> = std::result::Result<T, E>;
