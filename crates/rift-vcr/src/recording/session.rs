//! Per-page recording session.
//!
//! Every intercepted request goes through [`VcrSession::handle_request`]:
//! fingerprint, ignore check, fast-fail check, then replay, record or forward
//! depending on the session mode.

use super::mode::{ModeFlags, RecordMode};
use super::pending::PendingRecordings;
use super::replay::{replay_for, Replay};
use super::tasks::TaskCoordinator;
use crate::cassette::{Cassette, RecordedOutcome, RecordingResult};
use crate::error::{InterceptError, Result, VcrError};
use crate::fingerprint::{MatchKey, Matcher};
use crate::interceptor::{AbortReason, InterceptedRequest, Interceptor, LiveResponse, RequestId};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// Schemes whose responses are embedded in the URL itself.
const NON_NETWORK_SCHEMES: &[&str] = &["data:", "blob:"];

/// Failures reading a response body after the page that owned it went away.
static UNAVAILABLE_BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)timed out retrieving|no resource with given identifier|no data found for resource",
    )
    .expect("valid regex")
});

/// Hook invoked after a request's completion has been fully handled.
pub type RequestCompletedHook = Arc<dyn Fn(&RequestId) + Send + Sync>;

/// Tunables for a session. Built from [`crate::config::VcrConfig`].
#[derive(Clone)]
pub struct SessionOptions {
    pub mode: RecordMode,
    pub passthrough_domains: Vec<String>,
    pub deny_domains: Vec<String>,
    pub body_timeout: Duration,
    pub save_timeout: Duration,
    pub navigation_drain_timeout: Duration,
    pub on_request_completed: Option<RequestCompletedHook>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mode: RecordMode::Auto,
            passthrough_domains: Vec::new(),
            deny_domains: Vec::new(),
            body_timeout: Duration::from_millis(1000),
            save_timeout: Duration::from_millis(5000),
            navigation_drain_timeout: Duration::from_secs(600),
            on_request_completed: None,
        }
    }
}

/// What the session did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    /// Non-network scheme or pass-through host, forwarded untouched
    Ignored,
    /// Sub-frame or denied host, aborted without consulting the cassette
    FastFailed,
    /// Answered from the cassette
    Replayed,
    /// No recording and the mode aborts unmatched requests
    AbortedUnmatched,
    /// Forwarded live and watched for recording
    Recording,
    /// Forwarded live
    Forwarded,
}

/// How a live request ended.
#[derive(Debug, Clone)]
pub enum Completion {
    Finished(LiveResponse),
    Failed { error_text: String },
}

pub struct VcrSession {
    mode: RecordMode,
    flags: ModeFlags,
    matcher: Matcher,
    cassette: Arc<Cassette>,
    interceptor: Arc<dyn Interceptor>,
    options: SessionOptions,
    pending: PendingRecordings,
    tasks: TaskCoordinator,
}

impl VcrSession {
    pub fn new(
        cassette: Arc<Cassette>,
        interceptor: Arc<dyn Interceptor>,
        matcher: Matcher,
        options: SessionOptions,
    ) -> Arc<Self> {
        let mode = options.mode.resolve_from_env();
        info!(
            "Starting VCR session in {} mode on {:?}",
            mode,
            cassette.root()
        );
        Arc::new(Self {
            mode,
            flags: mode.flags(),
            matcher,
            cassette,
            interceptor,
            options,
            pending: PendingRecordings::new(),
            tasks: TaskCoordinator::new(),
        })
    }

    pub fn mode(&self) -> RecordMode {
        self.mode
    }

    pub fn flags(&self) -> ModeFlags {
        self.flags
    }

    pub fn cassette(&self) -> &Arc<Cassette> {
        &self.cassette
    }

    /// `(incomplete, saving)` counts of requests being recorded.
    pub fn pending_recordings(&self) -> (usize, usize) {
        self.pending.counts()
    }

    /// Interceptor entry point: handle a request in the background.
    pub fn on_request(self: &Arc<Self>, request: InterceptedRequest) -> AbortHandle {
        // Occurrence counts follow arrival order, so the key is claimed here
        // rather than inside the task.
        let key = self.matcher.match_key(&request);
        let session = Arc::clone(self);
        self.tasks
            .schedule(async move { session.handle_keyed(request, key).await.map(|_| ()) })
    }

    /// Interceptor entry point: a live request finished loading.
    pub fn on_request_finished(self: &Arc<Self>, id: RequestId, response: LiveResponse) -> AbortHandle {
        self.on_completion(id, Completion::Finished(response))
    }

    /// Interceptor entry point: a live request failed at the network layer.
    pub fn on_request_failed(
        self: &Arc<Self>,
        id: RequestId,
        error_text: impl Into<String>,
    ) -> AbortHandle {
        self.on_completion(
            id,
            Completion::Failed {
                error_text: error_text.into(),
            },
        )
    }

    fn on_completion(self: &Arc<Self>, id: RequestId, completion: Completion) -> AbortHandle {
        let session = Arc::clone(self);
        self.tasks.schedule(async move {
            let result = session.record_completion(&id, completion).await;
            if let Some(hook) = &session.options.on_request_completed {
                hook(&id);
            }
            result
        })
    }

    /// Wait for every scheduled record/replay task. Returns the first error
    /// any of them raised.
    pub async fn drain(&self) -> Result<()> {
        self.tasks.drain_all().await
    }

    /// Block until watched requests have finished and been saved, bounded by
    /// the navigation drain timeout.
    pub async fn wait_for_pending_recordings(&self) -> bool {
        self.pending
            .wait_until_idle(self.options.navigation_drain_timeout)
            .await
    }

    /// Decide and act on one intercepted request. Errors are logged with the
    /// request context before being returned.
    pub async fn handle_request(&self, request: InterceptedRequest) -> Result<RequestDecision> {
        let key = self.matcher.match_key(&request);
        self.handle_keyed(request, key).await
    }

    async fn handle_keyed(
        &self,
        request: InterceptedRequest,
        key: Result<MatchKey>,
    ) -> Result<RequestDecision> {
        let context = request.describe();
        let decision = match key {
            Ok(key) => self.decide(request, key).await,
            Err(e) => Err(e),
        };
        decision.inspect_err(|e| {
            error!("Error handling request {}: {}", context, e);
        })
    }

    async fn decide(&self, request: InterceptedRequest, key: MatchKey) -> Result<RequestDecision> {
        if self.should_ignore(&key) {
            self.interceptor.continue_request(&request.id).await?;
            return Ok(RequestDecision::Ignored);
        }

        if let Some(reason) = self.fast_fail_reason(&request, &key) {
            debug!("Fast-failing {} ({})", request.describe(), reason);
            self.interceptor.abort(&request.id, reason).await?;
            return Ok(RequestDecision::FastFailed);
        }

        if self.flags.replay_matched_requests {
            match self.cassette.lookup(&key).await? {
                Some(outcome) => {
                    self.replay(&request.id, &outcome).await?;
                    return Ok(RequestDecision::Replayed);
                }
                None if self.flags.abort_unmatched_requests => {
                    return self.abort_unmatched(&request, &key).await;
                }
                None => {}
            }
        }

        if self.flags.record_unmatched_requests {
            if request.is_navigation_request && self.is_main_frame(&request) {
                debug!("Navigation request {}, waiting for pending recordings", request.url);
                self.wait_for_pending_recordings().await;
            }
            self.pending.watch(request.id.clone(), key);
            self.interceptor.continue_request(&request.id).await?;
            return Ok(RequestDecision::Recording);
        }

        self.interceptor.continue_request(&request.id).await?;
        Ok(RequestDecision::Forwarded)
    }

    fn is_main_frame(&self, request: &InterceptedRequest) -> bool {
        request.frame_id == self.interceptor.main_frame_id()
    }

    fn should_ignore(&self, key: &MatchKey) -> bool {
        NON_NETWORK_SCHEMES.contains(&key.url.protocol.as_str())
            || host_listed(&self.options.passthrough_domains, &key.url.hostname)
    }

    fn fast_fail_reason(&self, request: &InterceptedRequest, key: &MatchKey) -> Option<AbortReason> {
        if !self.is_main_frame(request) {
            // Sub-frames are mostly ads and tracking
            return Some(AbortReason::TimedOut);
        }
        if host_listed(&self.options.deny_domains, &key.url.hostname) {
            return Some(AbortReason::BlockedByClient);
        }
        None
    }

    async fn replay(&self, id: &RequestId, outcome: &RecordedOutcome) -> Result<()> {
        match replay_for(outcome, Utc::now())? {
            Replay::Fulfill(fulfillment) => {
                debug!(
                    "Replaying {} with status {}",
                    outcome.key().display_url(),
                    fulfillment.status
                );
                self.interceptor.fulfill(id, fulfillment).await?;
            }
            Replay::Abort(reason) => {
                debug!(
                    "Replaying recorded failure of {} ({})",
                    outcome.key().display_url(),
                    reason
                );
                self.interceptor.abort(id, reason).await?;
            }
        }
        Ok(())
    }

    async fn abort_unmatched(
        &self,
        request: &InterceptedRequest,
        key: &MatchKey,
    ) -> Result<RequestDecision> {
        self.interceptor.abort(&request.id, AbortReason::Failed).await?;
        self.log_closest_match(key).await;

        if self.flags.throw_on_unmatched_requests {
            return Err(VcrError::UnmatchedRequest {
                method: key.method.clone(),
                url: request.url.clone(),
                key_count: key.key_count,
            });
        }
        Ok(RequestDecision::AbortedUnmatched)
    }

    async fn log_closest_match(&self, key: &MatchKey) {
        match self.cassette.closest_match(key).await {
            Ok(Some(closest)) => {
                let diff: Vec<String> = closest.diff.iter().map(ToString::to_string).collect();
                warn!(
                    "No recording for {} {} (occurrence {}); closest {} recording differs by {} field(s): {:?}",
                    key.method,
                    key.display_url(),
                    key.key_count,
                    closest.outcome.kind(),
                    closest.score(),
                    diff
                );
            }
            Ok(None) => warn!(
                "No recording for {} {} (occurrence {}) and nothing recorded for this path",
                key.method,
                key.display_url(),
                key.key_count
            ),
            Err(e) => debug!("Closest match lookup failed: {}", e),
        }
    }

    async fn record_completion(&self, id: &RequestId, completion: Completion) -> Result<()> {
        let Some(watched) = self.pending.begin_save(id) else {
            return Ok(());
        };
        let url = watched.key.display_url();

        let saved = match self.capture(id, completion, watched.started).await {
            Ok(result) => tokio::time::timeout(
                self.options.save_timeout,
                self.cassette.save(&watched.key, result),
            )
            .await
            .unwrap_or_else(|_| Err(VcrError::SaveTimedOut(url.clone()))),
            Err(e) => Err(e),
        };
        self.pending.finish_save(id);

        match saved {
            Ok(()) => Ok(()),
            Err(e) if is_unavailable_body(&e) => {
                debug!("Not recording {}, response is no longer available: {}", url, e);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to record {} {}#{}: {}",
                    watched.key.method, url, watched.key.key_count, e
                );
                Err(e)
            }
        }
    }

    async fn capture(
        &self,
        id: &RequestId,
        completion: Completion,
        started: std::time::Instant,
    ) -> Result<RecordingResult> {
        match completion {
            Completion::Failed { error_text } => Ok(RecordingResult::Failure { error_text }),
            Completion::Finished(response) => {
                let latency = started.elapsed();
                let body = if response.has_body() {
                    let read = tokio::time::timeout(
                        self.options.body_timeout,
                        self.interceptor.response_body(id),
                    )
                    .await
                    .map_err(|_| {
                        InterceptError::new("timed out retrieving request response body")
                    })??;
                    Some(read)
                } else {
                    None
                };
                Ok(RecordingResult::Success {
                    response,
                    body,
                    latency,
                })
            }
        }
    }
}

fn host_listed(domains: &[String], hostname: &str) -> bool {
    domains.iter().any(|d| d.eq_ignore_ascii_case(hostname))
}

/// Whether an error means the response body vanished with its page.
pub fn is_unavailable_body(error: &VcrError) -> bool {
    matches!(error, VcrError::Interceptor(e) if UNAVAILABLE_BODY.is_match(&e.message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_body_patterns() {
        let evicted: VcrError =
            InterceptError::new("Protocol error (Network.getResponseBody): No resource with given identifier found").into();
        assert!(is_unavailable_body(&evicted));

        let timed_out: VcrError =
            InterceptError::new("timed out retrieving request response body").into();
        assert!(is_unavailable_body(&timed_out));

        let other: VcrError = InterceptError::new("Target crashed").into();
        assert!(!is_unavailable_body(&other));

        let not_interceptor = VcrError::SaveTimedOut("no resource with given identifier".into());
        assert!(!is_unavailable_body(&not_interceptor));
    }

    #[test]
    fn test_host_listed_is_case_insensitive() {
        let domains = vec!["Ads.Example.com".to_string()];
        assert!(host_listed(&domains, "ads.example.com"));
        assert!(!host_listed(&domains, "example.com"));
    }
}
