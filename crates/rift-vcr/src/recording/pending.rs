//! Requests being watched for recording.
//!
//! A request enters `incomplete` when it is forwarded for recording, moves to
//! `saving` once the interceptor reports it finished or failed, and leaves
//! when its save completes. Navigations wait for both sets to empty because
//! tearing down the page makes outstanding response bodies unreadable.

use crate::fingerprint::MatchKey;
use crate::interceptor::RequestId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// A watched request and when it was forwarded.
#[derive(Debug, Clone)]
pub struct Watched {
    pub key: MatchKey,
    pub started: Instant,
}

#[derive(Default)]
struct PendingState {
    incomplete: HashMap<RequestId, Watched>,
    saving: HashMap<RequestId, MatchKey>,
}

#[derive(Default)]
pub struct PendingRecordings {
    state: Mutex<PendingState>,
    changed: Notify,
}

impl PendingRecordings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching a request that is about to be forwarded live.
    pub fn watch(&self, id: RequestId, key: MatchKey) {
        self.state.lock().incomplete.insert(
            id,
            Watched {
                key,
                started: Instant::now(),
            },
        );
    }

    /// Move a finished request into the saving set. `None` if the request was
    /// not being watched.
    pub fn begin_save(&self, id: &RequestId) -> Option<Watched> {
        let mut state = self.state.lock();
        let watched = state.incomplete.remove(id)?;
        state.saving.insert(id.clone(), watched.key.clone());
        Some(watched)
    }

    /// Mark a save as done, successful or not.
    pub fn finish_save(&self, id: &RequestId) {
        self.state.lock().saving.remove(id);
        self.changed.notify_waiters();
    }

    /// `(incomplete, saving)` counts.
    pub fn counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.incomplete.len(), state.saving.len())
    }

    pub fn is_idle(&self) -> bool {
        self.counts() == (0, 0)
    }

    /// Forget every watched request.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.incomplete.clear();
        state.saving.clear();
        drop(state);
        self.changed.notify_waiters();
    }

    fn describe_incomplete(&self) -> Vec<String> {
        self.state
            .lock()
            .incomplete
            .values()
            .map(|w| format!("{}#{}", w.key.display_url(), w.key.key_count))
            .collect()
    }

    /// Wait until nothing is pending. On timeout the pending sets are cleared
    /// and `false` is returned.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                return true;
            }
            let (incomplete, saving) = self.counts();
            debug!(
                "Waiting on {} incomplete and {} saving recordings",
                incomplete, saving
            );

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                warn!(
                    "Timed out waiting for pending recordings, dropping: {:?}",
                    self.describe_incomplete()
                );
                self.clear();
                return false;
            }
        }
    }
}
