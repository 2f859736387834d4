use serde::{Deserialize, Serialize};

/// Lifecycle state of a scan task.
///
/// The only valid walks are `PENDING → STARTED → PROCESSING →
/// {SUCCESS | FAILURE}` with a `PROCESSING ⇄ RETRY` sub-loop, plus the
/// direct `STARTED → SUCCESS | FAILURE` shortcut for trivial collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Accepted and queued, not yet claimed by a worker.
    Pending,
    /// Claimed by a worker.
    Started,
    /// Collector invocation in flight; `progress` carries free-form text.
    Processing,
    /// Waiting out a backoff before re-invoking the collector.
    Retry,
    /// Terminal: collector returned a result.
    Success,
    /// Terminal: see `error` for the kind.
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }

    /// Whether `next` is a legal successor of `self` in the status graph.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Started) => true,
            (Started, Processing) => true,
            // Shortcut for collectors that finish without progress updates.
            (Started, Success) | (Started, Failure) => true,
            (Processing, Retry) => true,
            (Processing, Success) | (Processing, Failure) => true,
            // Progress text updates re-put the same state.
            (Processing, Processing) => true,
            (Retry, Processing) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Started => "STARTED",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Retry => "RETRY",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failure => "FAILURE",
        };
        write!(f, "{}", s)
    }
}
