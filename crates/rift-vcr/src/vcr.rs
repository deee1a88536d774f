//! Entry point binding a cassette namespace to an interceptor.

use crate::cassette::{sanitize_filename, Cassette};
use crate::config::VcrConfig;
use crate::fingerprint::{CustomizeKey, MatchKey, Matcher};
use crate::interceptor::{Interceptor, RequestId};
use crate::recording::{RequestCompletedHook, VcrSession};
use std::path::PathBuf;
use std::sync::Arc;

/// Record/replay configuration plus the caller hooks that cannot live in a
/// config file.
#[derive(Clone, Default)]
pub struct Vcr {
    config: VcrConfig,
    customize_match_key: Option<CustomizeKey>,
    on_request_completed: Option<RequestCompletedHook>,
}

impl Vcr {
    pub fn new(config: VcrConfig) -> Self {
        Self {
            config,
            customize_match_key: None,
            on_request_completed: None,
        }
    }

    pub fn config(&self) -> &VcrConfig {
        &self.config
    }

    /// Rewrite every match key before it is hashed, e.g. to drop a volatile
    /// query parameter.
    pub fn customize_match_key<F>(mut self, customize: F) -> Self
    where
        F: Fn(MatchKey) -> MatchKey + Send + Sync + 'static,
    {
        self.customize_match_key = Some(Arc::new(customize));
        self
    }

    /// Called after each live completion has been handled.
    pub fn on_request_completed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestId) + Send + Sync + 'static,
    {
        self.on_request_completed = Some(Arc::new(hook));
        self
    }

    /// Cassette directory for a namespace.
    pub fn cassette_path(&self, namespace: &str) -> PathBuf {
        let normalized: String = namespace
            .to_lowercase()
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();
        self.config.cassette_root.join(sanitize_filename(&normalized))
    }

    /// Whether anything has been recorded for a namespace.
    pub async fn cassette_exists(&self, namespace: &str) -> bool {
        tokio::fs::metadata(self.cassette_path(namespace))
            .await
            .is_ok_and(|m| m.is_dir())
    }

    /// Start a session recording to or replaying from `namespace`. Each session
    /// starts with fresh occurrence counts.
    pub fn apply(&self, namespace: &str, interceptor: Arc<dyn Interceptor>) -> Arc<VcrSession> {
        let cassette = Arc::new(Cassette::new(self.cassette_path(namespace)));
        let matcher = Matcher::new(self.customize_match_key.clone());
        let mut options = self.config.session_options();
        options.on_request_completed = self.on_request_completed.clone();
        VcrSession::new(cassette, interceptor, matcher, options)
    }
}
