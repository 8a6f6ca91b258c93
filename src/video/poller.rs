//! Bounded poll loop that drives a task to a terminal state.

use crate::config::ModelConfig;
use crate::error::{EffigyError, Result};
use crate::observer::{NoopObserver, Observer, TaskEvent};
use crate::transport::Transport;
use crate::video::adapter::{VideoAdapter, DEFAULT_FAILURE_MESSAGE};
use crate::video::types::{TaskHandle, TaskState, TaskStatus};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default delay between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Default overall deadline.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(15 * 60);
/// Slack added to a server time estimate when widening the deadline.
pub const DEFAULT_ETA_GRACE: Duration = Duration::from_secs(120);
/// Consecutive transient failures tolerated before giving up.
pub const DEFAULT_MAX_TRANSIENT_ERRORS: u32 = 25;

/// Callback invoked with every successfully polled status.
pub type ProgressCallback<'a> = &'a (dyn Fn(&TaskStatus) + Send + Sync);

/// Something that can report the current status of a task.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Queries the task once.
    async fn query(&self, handle: &TaskHandle) -> Result<TaskStatus>;
}

/// Poll loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Delay between queries.
    pub interval: Duration,
    /// Deadline measured from the start of the loop.
    pub timeout: Duration,
    /// Added to a server estimate when widening the deadline.
    pub eta_grace: Duration,
    /// Consecutive transient failures that end the loop.
    pub max_transient_errors: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
            eta_grace: DEFAULT_ETA_GRACE,
            max_transient_errors: DEFAULT_MAX_TRANSIENT_ERRORS,
        }
    }
}

impl PollOptions {
    /// Sets the delay between queries.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the overall deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the estimate grace period.
    pub fn eta_grace(mut self, grace: Duration) -> Self {
        self.eta_grace = grace;
        self
    }

    /// Sets the transient failure cap. Values below 1 are raised to 1.
    pub fn max_transient_errors(mut self, max: u32) -> Self {
        self.max_transient_errors = max.max(1);
        self
    }
}

/// Drives a [`StatusSource`] until the task completes, fails or runs out of time.
///
/// Queries are strictly sequential. Transient failures (see
/// [`EffigyError::is_transient`]) are absorbed up to the configured cap and
/// a successful query resets the count. The first status carrying a time
/// estimate may widen the deadline to `estimate + eta_grace`; it never
/// shrinks and is adjusted at most once. A query still in flight when the
/// deadline passes is abandoned and the wait ends with
/// [`EffigyError::Timeout`].
///
/// Dropping the returned future stops polling at the next await point.
#[derive(Clone)]
pub struct TaskPoller {
    options: PollOptions,
    observer: Arc<dyn Observer>,
}

impl std::fmt::Debug for TaskPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPoller")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for TaskPoller {
    fn default() -> Self {
        Self::new(PollOptions::default())
    }
}

impl TaskPoller {
    /// Creates a poller without an observer.
    pub fn new(options: PollOptions) -> Self {
        Self {
            options,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Sets the observer notified of polls, transient failures and deadline changes.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the options in effect.
    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Polls until a terminal state and returns the result URL.
    pub async fn wait<S>(
        &self,
        source: &S,
        handle: &TaskHandle,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<String>
    where
        S: StatusSource + ?Sized,
    {
        let start = Instant::now();
        let mut deadline = self.options.timeout;
        let mut estimate_seen = false;
        let mut failures = 0u32;

        loop {
            let remaining = deadline.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(EffigyError::Timeout(deadline));
            }

            // A stalled query must not outlive the deadline.
            let queried = match tokio::time::timeout(remaining, source.query(handle)).await {
                Ok(queried) => queried,
                Err(_) => {
                    tracing::warn!(task_id = %handle, "status query still pending at deadline");
                    return Err(EffigyError::Timeout(deadline));
                }
            };

            match queried {
                Ok(status) => {
                    failures = 0;
                    tracing::debug!(
                        task_id = %handle,
                        state = %status.state,
                        progress = status.progress,
                        elapsed_secs = start.elapsed().as_secs(),
                        "polled task status"
                    );
                    self.observer.on_event(&TaskEvent::StatusPolled {
                        task_id: handle.to_string(),
                        state: status.state,
                        progress: status.progress,
                    });

                    if !estimate_seen {
                        if let Some(eta) = status.estimated_time {
                            estimate_seen = true;
                            let widened = eta + self.options.eta_grace;
                            if widened > deadline {
                                self.observer.on_event(&TaskEvent::DeadlineExtended {
                                    task_id: handle.to_string(),
                                    previous: deadline,
                                    extended: widened,
                                });
                                deadline = widened;
                            }
                        }
                    }

                    if let Some(callback) = on_progress {
                        callback(&status);
                    }

                    match status.state {
                        TaskState::Completed => {
                            return status.result_url.ok_or_else(|| {
                                EffigyError::Protocol(format!(
                                    "task {handle} completed without a result URL"
                                ))
                            });
                        }
                        TaskState::Failed => {
                            return Err(EffigyError::GenerationFailed(
                                status
                                    .error
                                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.into()),
                            ));
                        }
                        TaskState::Pending | TaskState::Processing => {}
                    }
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    tracing::warn!(
                        task_id = %handle,
                        attempt = failures,
                        max = self.options.max_transient_errors,
                        "task query failed: {e}"
                    );
                    self.observer.on_event(&TaskEvent::TransientError {
                        task_id: handle.to_string(),
                        attempt: failures,
                        message: e.to_string(),
                    });
                    if failures >= self.options.max_transient_errors {
                        return Err(EffigyError::QueryFailures {
                            attempts: failures,
                            source: Box::new(e),
                        });
                    }
                }
                Err(e) => return Err(e),
            }

            let remaining = deadline.saturating_sub(start.elapsed());
            tokio::time::sleep(self.options.interval.min(remaining)).await;
        }
    }
}

/// Queries a video task through an adapter and a transport.
pub(crate) struct VideoTaskSource<'a> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) adapter: &'a dyn VideoAdapter,
    pub(crate) config: &'a ModelConfig,
}

#[async_trait]
impl StatusSource for VideoTaskSource<'_> {
    async fn query(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        let request = self.adapter.query_task(handle.as_str(), self.config)?;
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        let body: Value = response.json()?;
        Ok(self.adapter.parse_status(handle.as_str(), &body))
    }
}
