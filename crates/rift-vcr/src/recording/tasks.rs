//! Tracking of background record/replay work.
//!
//! Interception events arrive on the interceptor's schedule, not the test's.
//! Every piece of work they trigger is registered here so teardown can wait
//! for the cassette to reach a fully flushed state.

use crate::error::{Result, VcrError};
use parking_lot::Mutex;
use std::future::Future;
use tokio::task::{AbortHandle, JoinSet};
use tracing::error;

#[derive(Default)]
pub struct TaskCoordinator {
    tasks: Mutex<JoinSet<Result<()>>>,
    /// Errors from tasks reaped before anyone drained them
    errors: Mutex<Vec<VcrError>>,
    /// Held for a whole drain; a concurrent drain waits for it and then
    /// drains whatever is left
    draining: tokio::sync::Mutex<()>,
}

impl TaskCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task and track it until the next drain.
    pub fn schedule<F>(&self, task: F) -> AbortHandle
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        while let Some(finished) = tasks.try_join_next() {
            self.stash(finished);
        }
        tasks.spawn(task)
    }

    /// Number of scheduled tasks not yet drained.
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    fn stash(&self, finished: std::result::Result<Result<()>, tokio::task::JoinError>) {
        match finished {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.errors.lock().push(e),
            Err(e) => self.errors.lock().push(VcrError::Task(e.to_string())),
        }
    }

    /// Wait for every scheduled task, including tasks scheduled while
    /// draining. Returns the first error any task reported; each error is
    /// reported by exactly one drain.
    pub async fn drain_all(&self) -> Result<()> {
        let _draining = self.draining.lock().await;
        loop {
            let mut batch = std::mem::take(&mut *self.tasks.lock());
            if batch.is_empty() {
                break;
            }
            while let Some(finished) = batch.join_next().await {
                self.stash(finished);
            }
        }

        let mut errors = std::mem::take(&mut *self.errors.lock()).into_iter();
        match errors.next() {
            None => Ok(()),
            Some(first) => {
                for other in errors {
                    error!("Additional task failure: {}", other);
                }
                Err(first)
            }
        }
    }
}
