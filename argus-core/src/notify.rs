//! Pub/sub fan-out of task transitions.
//!
//! The notifier is a pure observer of Task Store writes: every `Put`
//! becomes one [`TaskEvent`] on the task's broadcast channel. Events carry
//! full snapshots, so delivery is idempotent for subscribers; ordering is
//! guaranteed per task (the owning worker writes transitions sequentially)
//! and nowhere else. Losing a subscriber never affects store correctness.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use argus_model::{TaskEvent, TaskId};

#[derive(Debug, Clone, Copy)]
pub struct NotifyPolicy {
    /// Broadcast buffer per task; a subscriber that lags past it observes
    /// a `Lagged` gap and should fall back to polling.
    pub channel_capacity: usize,
    /// Drop the channel once the terminal transition is published, ending
    /// subscriber streams after they drain.
    pub close_on_terminal: bool,
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            close_on_terminal: true,
        }
    }
}

/// Sink the Task Store publishes into on every write.
pub trait TransitionPublisher: Send + Sync {
    fn publish(&self, event: TaskEvent);

    /// The task's record was evicted; any fan-out state can go with it.
    fn retire(&self, _task_id: &TaskId) {}
}

#[derive(Debug)]
pub struct TaskNotifier {
    channels: DashMap<TaskId, broadcast::Sender<TaskEvent>>,
    policy: NotifyPolicy,
}

impl TaskNotifier {
    pub fn new(policy: NotifyPolicy) -> Self {
        Self {
            channels: DashMap::new(),
            policy,
        }
    }

    /// Open a live-status subscription for one task. The channel is
    /// created on first use; the caller is expected to send the current
    /// snapshot itself (subscribers get no history replay).
    pub fn subscribe(&self, task_id: TaskId) -> broadcast::Receiver<TaskEvent> {
        self.channels
            .entry(task_id)
            .or_insert_with(|| {
                broadcast::channel(self.policy.channel_capacity.max(1)).0
            })
            .subscribe()
    }

    pub fn subscriber_count(&self, task_id: &TaskId) -> usize {
        self.channels
            .get(task_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Drop a task's channel outright (eviction path).
    pub fn forget(&self, task_id: &TaskId) {
        self.channels.remove(task_id);
    }
}

impl TransitionPublisher for TaskNotifier {
    fn publish(&self, event: TaskEvent) {
        let task_id = event.task.task_id;
        let terminal = event.is_terminal();

        if let Some(tx) = self.channels.get(&task_id) {
            // A send error only means nobody is listening right now.
            if tx.send(event).is_err() {
                debug!(task_id = %task_id, "transition published with no subscribers");
            }
        }

        if terminal && self.policy.close_on_terminal {
            self.channels.remove(&task_id);
        }
    }

    fn retire(&self, task_id: &TaskId) {
        self.channels.remove(task_id);
    }
}
