use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::TaskStatus;
use crate::task::TaskView;

/// Message type attached to a task transition as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    /// Current state sent to a subscriber that connected mid-flight, and
    /// for the initial `PENDING` write.
    Snapshot,
    Started,
    Progress,
    Retry,
    Complete,
    Failed,
}

impl TaskEventKind {
    /// Event kind implied by the status a write landed the task in.
    pub fn for_status(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending => TaskEventKind::Snapshot,
            TaskStatus::Started => TaskEventKind::Started,
            TaskStatus::Processing => TaskEventKind::Progress,
            TaskStatus::Retry => TaskEventKind::Retry,
            TaskStatus::Success => TaskEventKind::Complete,
            TaskStatus::Failure => TaskEventKind::Failed,
        }
    }
}

/// One task transition, carrying the full current snapshot rather than a
/// diff: delivering the same event twice leaves a subscriber's derived
/// state unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    #[serde(rename = "type")]
    pub kind: TaskEventKind,
    #[serde(flatten)]
    pub task: TaskView,
}

impl TaskEvent {
    pub fn from_view(task: TaskView) -> Self {
        Self {
            kind: TaskEventKind::for_status(task.status),
            task,
        }
    }

    pub fn snapshot(task: TaskView) -> Self {
        Self {
            kind: TaskEventKind::Snapshot,
            task,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.task.status.is_terminal()
    }
}

/// Wire frame for the live-status WebSocket stream: task transitions plus
/// periodic liveness heartbeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamMessage {
    Event(TaskEvent),
    Heartbeat {
        #[serde(rename = "type")]
        kind: HeartbeatTag,
        timestamp: DateTime<Utc>,
    },
}

/// Marker so heartbeat frames serialize as `{"type":"heartbeat",...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatTag {
    Heartbeat,
}

impl StreamMessage {
    pub fn heartbeat() -> Self {
        StreamMessage::Heartbeat {
            kind: HeartbeatTag::Heartbeat,
            timestamp: Utc::now(),
        }
    }
}
