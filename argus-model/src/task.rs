use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{AccountId, TaskId};
use crate::status::TaskStatus;

/// Classification of a terminal or retryable task error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network blip or upstream 5xx; eligible for retry.
    Transient,
    /// Bad target or upstream 4xx; never retried.
    Permanent,
    /// Hard deadline expired while the collector was still running.
    Timeout,
    /// Maximum attempts spent on transient failures.
    RetriesExhausted,
    /// Cancellation request observed at a worker checkpoint.
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RetriesExhausted => "retries_exhausted",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Error recorded on a failed task, surfaced verbatim by poll and push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Attempted status transition that is not an edge of the status graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// Full lifecycle record of one scan task.
///
/// Created by admission in `PENDING`; afterwards mutated only by the single
/// worker that owns the task, which keeps the record free of per-field
/// locking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub account_id: AccountId,
    pub scan_type: String,
    pub target: String,
    pub status: TaskStatus,
    pub progress: Option<String>,
    pub result: Option<Value>,
    pub error: Option<TaskError>,
    pub retry_count: u32,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        account_id: AccountId,
        scan_type: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: TaskId::new(),
            account_id,
            scan_type: scan_type.into(),
            target: target.into(),
            status: TaskStatus::Pending,
            progress: Some("Task is waiting in queue".to_string()),
            result: None,
            error: None,
            retry_count: 0,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the record to `next`, refusing walks the status graph does not
    /// allow. Monotonicity is enforced here and nowhere else.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            task_id: self.task_id,
            scan_type: self.scan_type.clone(),
            target: self.target.clone(),
            status: self.status,
            progress: self.progress.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            retry_count: self.retry_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Externally visible projection of a [`TaskRecord`].
///
/// Poll responses and push messages are both built from this type so the
/// two channels can never diverge in the data they report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub scan_type: String,
    pub target: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord::new(AccountId::new(), "dns", "example.com")
    }

    #[test]
    fn new_record_is_pending() {
        let task = record();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert!(!task.cancel_requested);
        assert!(task.result.is_none());
        assert!(task.error.is_none());
    }

    #[test]
    fn transition_walks_the_graph() {
        let mut task = record();
        task.transition(TaskStatus::Started).unwrap();
        task.transition(TaskStatus::Processing).unwrap();
        task.transition(TaskStatus::Retry).unwrap();
        task.transition(TaskStatus::Processing).unwrap();
        task.transition(TaskStatus::Success).unwrap();
        assert!(task.is_terminal());
    }

    #[test]
    fn invalid_transition_is_refused_and_state_kept() {
        let mut task = record();
        let err = task.transition(TaskStatus::Success).unwrap_err();
        assert_eq!(err.from, TaskStatus::Pending);
        assert_eq!(err.to, TaskStatus::Success);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn transition_touches_updated_at() {
        let mut task = record();
        let before = task.updated_at;
        task.transition(TaskStatus::Started).unwrap();
        assert!(task.updated_at >= before);
    }

    #[test]
    fn view_mirrors_record_fields() {
        let mut task = record();
        task.transition(TaskStatus::Started).unwrap();
        task.error = Some(TaskError::new(ErrorKind::Transient, "connection reset"));
        let view = task.view();
        assert_eq!(view.task_id, task.task_id);
        assert_eq!(view.status, TaskStatus::Started);
        assert_eq!(view.error, task.error);
    }
}
