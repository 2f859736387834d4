//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, TaskId};
use crate::status::TaskStatus;

/// Body of `POST /scan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSubmission {
    /// Domain, IP, username, email... interpreted by the collector.
    pub target: String,
    pub scan_type: String,
}

/// Successful admission: the task id is the caller's only guaranteed
/// observable side effect; everything else happens asynchronously.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanAccepted {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub scan_type: String,
    pub target: String,
    pub cost: u64,
    pub credits_remaining: u64,
}

/// Acknowledgment of a cancellation request. `CANCELLING` is a response
/// field only; the task itself terminates through the normal status set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAck {
    pub task_id: TaskId,
    pub status: String,
    pub message: String,
}

impl CancelAck {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: "CANCELLING".to_string(),
            message: "Cancellation requested. Credits are not refunded."
                .to_string(),
        }
    }
}

/// One entry of `GET /collectors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorInfo {
    pub scan_type: String,
    pub cost: u64,
    pub description: String,
}

/// Body of `GET /credits`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsInfo {
    pub account_id: AccountId,
    pub credits: u64,
    pub active: bool,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub workers: usize,
    pub queued: usize,
}
