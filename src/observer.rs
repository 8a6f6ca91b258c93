//! Diagnostic events emitted while a generation task runs.

use crate::config::ProviderFamily;
use crate::video::TaskState;
use std::time::Duration;

/// A diagnostic event from the transport, poller or client.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A task was accepted by the provider.
    TaskCreated {
        /// Provider task identifier.
        task_id: String,
        /// Dialect used to create it.
        family: ProviderFamily,
    },
    /// A status query succeeded.
    StatusPolled {
        /// Provider task identifier.
        task_id: String,
        /// Canonical state reported.
        state: TaskState,
        /// Progress percentage, if reported.
        progress: Option<u8>,
    },
    /// A status query failed transiently and will be retried.
    TransientError {
        /// Provider task identifier.
        task_id: String,
        /// Consecutive failures so far.
        attempt: u32,
        /// Failure description.
        message: String,
    },
    /// The poll deadline was widened from a server estimate.
    DeadlineExtended {
        /// Provider task identifier.
        task_id: String,
        /// Deadline before the adjustment.
        previous: Duration,
        /// Deadline after the adjustment.
        extended: Duration,
    },
    /// A request was routed through the CORS relay.
    ProxyFallback {
        /// Original target URL.
        url: String,
    },
    /// Image generation fell back to a placeholder.
    PlaceholderUsed {
        /// Prompt identity the placeholder belongs to.
        key: String,
        /// Placeholder URL returned.
        url: String,
    },
}

/// Receives diagnostic events.
pub trait Observer: Send + Sync {
    /// Called for every event.
    fn on_event(&self, event: &TaskEvent);
}

/// Observer that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &TaskEvent) {}
}

/// Observer that forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &TaskEvent) {
        match event {
            TaskEvent::TaskCreated { task_id, family } => {
                tracing::info!(task_id = %task_id, family = %family, "generation task created");
            }
            TaskEvent::StatusPolled {
                task_id,
                state,
                progress,
            } => {
                tracing::debug!(task_id = %task_id, state = %state, progress, "task status");
            }
            TaskEvent::TransientError {
                task_id,
                attempt,
                message,
            } => {
                tracing::warn!(task_id = %task_id, attempt, "transient query failure: {message}");
            }
            TaskEvent::DeadlineExtended {
                task_id,
                previous,
                extended,
            } => {
                tracing::info!(
                    task_id = %task_id,
                    previous_secs = previous.as_secs(),
                    extended_secs = extended.as_secs(),
                    "poll deadline extended from server estimate"
                );
            }
            TaskEvent::ProxyFallback { url } => {
                tracing::warn!(url = %url, "routing request through CORS relay");
            }
            TaskEvent::PlaceholderUsed { key, url } => {
                tracing::warn!(key = %key, url = %url, "using placeholder image");
            }
        }
    }
}
