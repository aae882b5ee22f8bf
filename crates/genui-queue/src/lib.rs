use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Scheduler is shutting down")]
    ShuttingDown,
}

/// Why a launched task did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure<E> {
    /// The task returned an error
    Failed(E),
    /// The task panicked
    Panicked,
    /// The task was aborted before it finished
    Cancelled,
}

impl<E: fmt::Display> fmt::Display for TaskFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Failed(e) => write!(f, "{}", e),
            TaskFailure::Panicked => f.write_str("task panicked"),
            TaskFailure::Cancelled => f.write_str("task cancelled"),
        }
    }
}

pub type TaskResult<T, E> = Result<T, TaskFailure<E>>;

/// Runs tasks detached from their caller, at most `max_concurrent` at a time.
///
/// Every launched task has its completion handler invoked exactly once, with
/// the task's value, its error, or a panic/cancellation report.
#[derive(Clone)]
pub struct BackgroundScheduler {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    waiting: Arc<AtomicUsize>,
}

impl BackgroundScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start `task` in the background and return immediately.
    ///
    /// `task` is only called once a concurrency slot is free, so any "started"
    /// bookkeeping belongs inside it. `on_complete` always runs afterwards.
    pub fn launch<F, Fut, T, E, C>(
        &self,
        label: impl Into<String>,
        task: F,
        on_complete: C,
    ) -> Result<(), SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        C: FnOnce(TaskResult<T, E>) + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(SchedulerError::ShuttingDown);
        }

        let label = label.into();
        let permits = self.permits.clone();
        let waiting = self.waiting.clone();
        waiting.fetch_add(1, Ordering::SeqCst);
        debug!(task = %label, "Background task queued");

        self.tracker.spawn(async move {
            let permit = permits.acquire_owned().await;
            waiting.fetch_sub(1, Ordering::SeqCst);

            let _permit = match permit {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(task = %label, "Scheduler closed before task could start");
                    on_complete(Err(TaskFailure::Cancelled));
                    return;
                }
            };

            info!(task = %label, "Background task started");
            // `task` is called inside the guard so panics while building the future are caught too
            let guarded = std::panic::AssertUnwindSafe(async move { task().await }).catch_unwind();

            let result = match guarded.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(TaskFailure::Failed(e)),
                Err(_) => {
                    error!(task = %label, "Background task panicked");
                    Err(TaskFailure::Panicked)
                }
            };

            debug!(task = %label, ok = result.is_ok(), "Background task finished");
            on_complete(result);
        });

        Ok(())
    }

    /// Tasks launched and not yet finished, queued ones included
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Tasks holding a concurrency slot right now
    pub fn running(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.permits.available_permits())
    }

    /// Tasks waiting for a concurrency slot
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Stop accepting tasks and wait for every launched task to finish.
    ///
    /// Returns `false` if `timeout` elapsed first; those tasks keep running.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> bool {
        self.tracker.close();
        info!(active = self.tracker.len(), "Draining background tasks");

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.tracker.wait()).await {
                Ok(()) => true,
                Err(_) => {
                    warn!(
                        remaining = self.tracker.len(),
                        "Background tasks still running after {:?}", limit
                    );
                    false
                }
            },
            None => {
                self.tracker.wait().await;
                true
            }
        }
    }
}

impl Default for BackgroundScheduler {
    fn default() -> Self {
        Self::new(4)
    }
}
