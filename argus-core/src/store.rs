//! Keyed task lifecycle storage, the single source of truth for task
//! state.
//!
//! Every write is immediately visible to subsequent reads and is published
//! to the [`TransitionPublisher`] after the entry guard is released, so
//! poll and push can only diverge in latency, never in data. Terminal
//! records are evicted after a retention window; eviction leaves a
//! tombstone for one further window so an expired task id stays
//! distinguishable from one that never existed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use argus_model::{
    AccountId, TaskEvent, TaskId, TaskRecord, TaskStatus, TaskView,
    TransitionError,
};

use crate::notify::TransitionPublisher;

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// How long a terminal record stays readable.
    pub terminal_ttl: Duration,
    pub sweep_interval: Duration,
    /// Most recent task ids kept per account for the history listing.
    pub history_depth: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            terminal_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            history_depth: 100,
        }
    }
}

/// Outcome of a status query by task id.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(TaskView),
    /// The task reached a terminal state and its record aged out.
    Expired,
    NeverExisted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    #[error("task not found")]
    NotFound,

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    #[error("task not found")]
    NotFound,

    #[error("task already terminal ({0})")]
    AlreadyTerminal(TaskStatus),
}

pub struct TaskStore {
    tasks: DashMap<TaskId, TaskRecord>,
    tombstones: DashMap<TaskId, DateTime<Utc>>,
    history: DashMap<AccountId, VecDeque<TaskId>>,
    publisher: Arc<dyn TransitionPublisher>,
    policy: RetentionPolicy,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("tasks", &self.tasks.len())
            .field("tombstones", &self.tombstones.len())
            .finish()
    }
}

impl TaskStore {
    pub fn new(
        policy: RetentionPolicy,
        publisher: Arc<dyn TransitionPublisher>,
    ) -> Self {
        Self {
            tasks: DashMap::new(),
            tombstones: DashMap::new(),
            history: DashMap::new(),
            publisher,
            policy,
        }
    }

    /// Store a freshly admitted `PENDING` record and publish its snapshot.
    pub fn insert(&self, record: TaskRecord) {
        let event = TaskEvent::from_view(record.view());
        let account_id = record.account_id;
        let task_id = record.task_id;

        self.tasks.insert(task_id, record);

        let mut recent = self.history.entry(account_id).or_default();
        recent.push_back(task_id);
        while recent.len() > self.policy.history_depth {
            recent.pop_front();
        }
        drop(recent);

        self.publisher.publish(event);
    }

    pub fn get(&self, task_id: &TaskId) -> Option<TaskRecord> {
        self.tasks.get(task_id).map(|r| r.clone())
    }

    pub fn lookup(&self, task_id: &TaskId) -> Lookup {
        if let Some(record) = self.tasks.get(task_id) {
            return Lookup::Found(record.view());
        }
        if self.tombstones.contains_key(task_id) {
            return Lookup::Expired;
        }
        Lookup::NeverExisted
    }

    /// Mutate a record in place and publish the result.
    ///
    /// Only the worker owning the task calls this; the entry guard is
    /// released before the publish so no store lock is held while fanning
    /// out.
    pub fn update<F>(
        &self,
        task_id: &TaskId,
        mutate: F,
    ) -> Result<TaskView, UpdateError>
    where
        F: FnOnce(&mut TaskRecord) -> Result<(), TransitionError>,
    {
        let event = {
            let mut record =
                self.tasks.get_mut(task_id).ok_or(UpdateError::NotFound)?;
            mutate(&mut record)?;
            record.updated_at = Utc::now();
            TaskEvent::from_view(record.view())
        };

        let view = event.task.clone();
        self.publisher.publish(event);
        Ok(view)
    }

    /// Flag a task for cancellation. Not preemptive: the owning worker
    /// acts on the flag at its next checkpoint.
    pub fn request_cancel(
        &self,
        task_id: &TaskId,
    ) -> Result<TaskView, CancelError> {
        let event = {
            let mut record =
                self.tasks.get_mut(task_id).ok_or(CancelError::NotFound)?;
            if record.is_terminal() {
                return Err(CancelError::AlreadyTerminal(record.status));
            }
            record.cancel_requested = true;
            record.progress = Some("Cancellation requested".to_string());
            record.updated_at = Utc::now();
            TaskEvent::from_view(record.view())
        };

        let view = event.task.clone();
        self.publisher.publish(event);
        Ok(view)
    }

    pub fn cancel_requested(&self, task_id: &TaskId) -> bool {
        self.tasks
            .get(task_id)
            .map(|r| r.cancel_requested)
            .unwrap_or(false)
    }

    /// Most recent tasks for one account, newest first. Evicted entries
    /// are silently skipped.
    pub fn history(&self, account_id: &AccountId, limit: usize) -> Vec<TaskView> {
        let Some(recent) = self.history.get(account_id) else {
            return Vec::new();
        };
        recent
            .iter()
            .rev()
            .filter_map(|id| self.tasks.get(id).map(|r| r.view()))
            .take(limit)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Evict terminal records past their retention window and prune
    /// tombstones past a second window. Returns the evicted count.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::from_std(self.policy.terminal_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        let expired: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|entry| {
                entry.is_terminal() && now - entry.updated_at >= ttl
            })
            .map(|entry| entry.task_id)
            .collect();

        for task_id in &expired {
            self.tasks.remove(task_id);
            self.tombstones.insert(*task_id, now);
            self.publisher.retire(task_id);
        }

        self.tombstones.retain(|_, evicted_at| now - *evicted_at < ttl);

        expired.len()
    }

    /// Background eviction loop; runs until the store is dropped.
    pub fn spawn_eviction(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.policy.sweep_interval;
        let store = Arc::downgrade(&self);
        drop(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(
                tokio::time::MissedTickBehavior::Skip,
            );
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else { break };
                let evicted = store.sweep();
                if evicted > 0 {
                    debug!(evicted, "evicted terminal task records");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_model::TaskEventKind;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<TaskEvent>>,
    }

    impl TransitionPublisher for RecordingPublisher {
        fn publish(&self, event: TaskEvent) {
            self.events.lock().push(event);
        }
    }

    fn store_with(
        policy: RetentionPolicy,
    ) -> (TaskStore, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        (TaskStore::new(policy, publisher.clone()), publisher)
    }

    fn store() -> (TaskStore, Arc<RecordingPublisher>) {
        store_with(RetentionPolicy::default())
    }

    fn pending(account: AccountId) -> TaskRecord {
        TaskRecord::new(account, "dns", "example.com")
    }

    #[test]
    fn put_is_visible_to_get() {
        let (store, _) = store();
        let record = pending(AccountId::new());
        let task_id = record.task_id;

        store.insert(record);
        assert_eq!(store.get(&task_id).unwrap().status, TaskStatus::Pending);
        assert!(matches!(store.lookup(&task_id), Lookup::Found(_)));
    }

    #[test]
    fn every_write_is_published() {
        let (store, publisher) = store();
        let record = pending(AccountId::new());
        let task_id = record.task_id;
        store.insert(record);

        store
            .update(&task_id, |t| t.transition(TaskStatus::Started))
            .unwrap();

        let events = publisher.events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, TaskEventKind::Snapshot);
        assert_eq!(events[1].kind, TaskEventKind::Started);
        assert_eq!(events[1].task.status, TaskStatus::Started);
    }

    #[test]
    fn invalid_transition_is_refused_and_unpublished() {
        let (store, publisher) = store();
        let record = pending(AccountId::new());
        let task_id = record.task_id;
        store.insert(record);

        let err = store
            .update(&task_id, |t| t.transition(TaskStatus::Success))
            .unwrap_err();
        assert!(matches!(err, UpdateError::Transition(_)));
        assert_eq!(publisher.events.lock().len(), 1);
        assert_eq!(store.get(&task_id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn update_of_missing_task_reports_not_found() {
        let (store, _) = store();
        let err = store
            .update(&TaskId::new(), |t| t.transition(TaskStatus::Started))
            .unwrap_err();
        assert_eq!(err, UpdateError::NotFound);
    }

    #[test]
    fn cancel_sets_flag_without_touching_status() {
        let (store, _) = store();
        let record = pending(AccountId::new());
        let task_id = record.task_id;
        store.insert(record);

        let view = store.request_cancel(&task_id).unwrap();
        assert_eq!(view.status, TaskStatus::Pending);
        assert!(store.cancel_requested(&task_id));
    }

    #[test]
    fn cancel_of_terminal_task_conflicts() {
        let (store, _) = store();
        let record = pending(AccountId::new());
        let task_id = record.task_id;
        store.insert(record);
        store
            .update(&task_id, |t| {
                t.transition(TaskStatus::Started)?;
                t.transition(TaskStatus::Success)
            })
            .unwrap();

        assert_eq!(
            store.request_cancel(&task_id),
            Err(CancelError::AlreadyTerminal(TaskStatus::Success))
        );
    }

    #[test]
    fn cancel_of_unknown_task_is_not_found() {
        let (store, _) = store();
        assert_eq!(
            store.request_cancel(&TaskId::new()),
            Err(CancelError::NotFound)
        );
    }

    #[test]
    fn history_is_newest_first_and_depth_bounded() {
        let (store, _) = store_with(RetentionPolicy {
            history_depth: 3,
            ..RetentionPolicy::default()
        });
        let account = AccountId::new();

        let mut ids = Vec::new();
        for _ in 0..5 {
            let record = pending(account);
            ids.push(record.task_id);
            store.insert(record);
        }

        let history = store.history(&account, 10);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].task_id, ids[4]);
        assert_eq!(history[2].task_id, ids[2]);

        // Trimming the index does not evict the record itself.
        assert!(store.get(&ids[0]).is_some());
    }

    #[test]
    fn sweep_evicts_only_aged_terminal_records() {
        let (store, _) = store_with(RetentionPolicy {
            terminal_ttl: Duration::from_secs(60),
            ..RetentionPolicy::default()
        });

        let running = pending(AccountId::new());
        let running_id = running.task_id;
        store.insert(running);

        let done = pending(AccountId::new());
        let done_id = done.task_id;
        store.insert(done);
        store
            .update(&done_id, |t| {
                t.transition(TaskStatus::Started)?;
                t.transition(TaskStatus::Success)
            })
            .unwrap();

        // Nothing is old enough yet.
        assert_eq!(store.sweep_at(Utc::now()), 0);

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(store.sweep_at(later), 1);
        assert!(matches!(store.lookup(&done_id), Lookup::Expired));
        assert!(matches!(store.lookup(&running_id), Lookup::Found(_)));
    }

    #[test]
    fn tombstones_age_out_to_never_existed() {
        let (store, _) = store_with(RetentionPolicy {
            terminal_ttl: Duration::from_secs(60),
            ..RetentionPolicy::default()
        });
        let record = pending(AccountId::new());
        let task_id = record.task_id;
        store.insert(record);
        store
            .update(&task_id, |t| {
                t.transition(TaskStatus::Started)?;
                t.transition(TaskStatus::Failure)
            })
            .unwrap();

        let first_sweep = Utc::now() + chrono::Duration::seconds(61);
        store.sweep_at(first_sweep);
        assert!(matches!(store.lookup(&task_id), Lookup::Expired));

        let second_sweep = first_sweep + chrono::Duration::seconds(61);
        store.sweep_at(second_sweep);
        assert!(matches!(store.lookup(&task_id), Lookup::NeverExisted));
    }
}
