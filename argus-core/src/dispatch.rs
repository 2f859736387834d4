//! Worker pool: claims admitted tasks and drives them through the
//! collector with retry, timeout, and cooperative cancellation policy.
//!
//! Exactly one worker owns a task for its whole lifetime, retries
//! included, so task records never see concurrent writers. Workers share
//! a FIFO queue; there is no priority. A task failure is recorded, never
//! propagated — nothing here can take down the pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use argus_model::{ErrorKind, TaskError, TaskId, TaskStatus, TaskView};

use crate::registry::{CollectorContext, CollectorRegistry};
use crate::store::{CancelError, TaskStore};

/// Pool sizing and per-attempt retry/timeout policy.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    pub workers: usize,
    /// Total collector invocations per task, first try included.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// When the cooperative wrap-up signal fires within each attempt.
    pub soft_deadline: Duration,
    /// Forcible per-attempt cutoff; expiry is a terminal timeout failure.
    pub hard_deadline: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            soft_deadline: Duration::from_secs(25),
            hard_deadline: Duration::from_secs(30),
        }
    }
}

type SharedQueue = Arc<Mutex<mpsc::UnboundedReceiver<TaskId>>>;

struct WorkerContext {
    store: Arc<TaskStore>,
    registry: Arc<CollectorRegistry>,
    policy: DispatchPolicy,
    inflight: Arc<DashMap<TaskId, CancellationToken>>,
    queued: Arc<AtomicUsize>,
}

/// Cloneable handle to the running pool: enqueue on admission, cancel on
/// request. Dropping every handle closes the queue and drains the pool.
#[derive(Clone)]
pub struct Dispatcher {
    queue_tx: mpsc::UnboundedSender<TaskId>,
    inflight: Arc<DashMap<TaskId, CancellationToken>>,
    queued: Arc<AtomicUsize>,
    store: Arc<TaskStore>,
    workers: usize,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.workers)
            .field("queued", &self.queued())
            .finish()
    }
}

impl Dispatcher {
    /// Start the worker pool and return its handle.
    pub fn spawn(
        policy: DispatchPolicy,
        store: Arc<TaskStore>,
        registry: Arc<CollectorRegistry>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue: SharedQueue = Arc::new(Mutex::new(queue_rx));
        let inflight = Arc::new(DashMap::new());
        let queued = Arc::new(AtomicUsize::new(0));

        for worker in 0..policy.workers {
            let ctx = WorkerContext {
                store: store.clone(),
                registry: registry.clone(),
                policy,
                inflight: inflight.clone(),
                queued: queued.clone(),
            };
            tokio::spawn(worker_loop(worker, queue.clone(), ctx));
        }

        Self {
            queue_tx,
            inflight,
            queued,
            store,
            workers: policy.workers,
        }
    }

    /// Queue an admitted task for the next free worker (FIFO).
    pub fn enqueue(&self, task_id: TaskId) {
        self.queued.fetch_add(1, Ordering::Relaxed);
        if self.queue_tx.send(task_id).is_err() {
            self.queued.fetch_sub(1, Ordering::Relaxed);
            warn!(task_id = %task_id, "dispatch queue closed; task will not run");
        }
    }

    /// Flag a task for cancellation and fire the wrap-up signal of its
    /// in-flight attempt, if any. Not preemptive: a collector that
    /// ignores the signal runs on, and only the next retry is prevented.
    pub fn cancel(&self, task_id: &TaskId) -> Result<TaskView, CancelError> {
        let view = self.store.request_cancel(task_id)?;
        if let Some(token) = self.inflight.get(task_id) {
            token.cancel();
        }
        Ok(view)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }
}

async fn worker_loop(worker: usize, queue: SharedQueue, ctx: WorkerContext) {
    loop {
        let claimed = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(task_id) = claimed else { break };
        ctx.queued.fetch_sub(1, Ordering::Relaxed);
        run_task(worker, task_id, &ctx).await;
    }
    debug!(worker, "queue closed, worker exiting");
}

async fn run_task(worker: usize, task_id: TaskId, ctx: &WorkerContext) {
    let Some(record) = ctx.store.get(&task_id) else {
        warn!(task_id = %task_id, "claimed task has no record");
        return;
    };

    if ctx
        .store
        .update(&task_id, |t| {
            t.progress = Some("Task execution has started".to_string());
            t.transition(TaskStatus::Started)
        })
        .is_err()
    {
        warn!(task_id = %task_id, "task vanished before start");
        return;
    }

    info!(
        worker,
        task_id = %task_id,
        scan_type = %record.scan_type,
        target = %record.target,
        "task claimed"
    );

    let Some(collector) = ctx.registry.resolve(&record.scan_type) else {
        // Admission validated the scan type; this can only mean the
        // registry and the admitted task disagree.
        fail(
            ctx,
            &task_id,
            ErrorKind::Permanent,
            format!("no collector registered for {:?}", record.scan_type),
        );
        return;
    };

    if ctx.store.cancel_requested(&task_id) {
        fail(ctx, &task_id, ErrorKind::Cancelled, "cancelled before execution");
        return;
    }

    let max_attempts = ctx.policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let progress = if attempt == 1 {
            format!("Running {} collector", record.scan_type)
        } else {
            format!(
                "Running {} collector (attempt {attempt}/{max_attempts})",
                record.scan_type
            )
        };
        // Register the wrap-up token before the PROCESSING write becomes
        // visible: a cancel that races the transition must still find it.
        let wrap_up = CancellationToken::new();
        ctx.inflight.insert(task_id, wrap_up.clone());

        if ctx
            .store
            .update(&task_id, |t| {
                t.progress = Some(progress);
                t.transition(TaskStatus::Processing)
            })
            .is_err()
        {
            ctx.inflight.remove(&task_id);
            return;
        }

        if ctx.store.cancel_requested(&task_id) {
            ctx.inflight.remove(&task_id);
            fail(ctx, &task_id, ErrorKind::Cancelled, "cancelled before execution");
            return;
        }

        let soft_timer = {
            let token = wrap_up.clone();
            let soft_deadline = ctx.policy.soft_deadline;
            tokio::spawn(async move {
                tokio::time::sleep(soft_deadline).await;
                token.cancel();
            })
        };
        let collect_ctx =
            CollectorContext::new(wrap_up, ctx.policy.soft_deadline);

        let outcome = tokio::time::timeout(
            ctx.policy.hard_deadline,
            collector.collect(&record.target, &collect_ctx),
        )
        .await;

        soft_timer.abort();
        ctx.inflight.remove(&task_id);

        match outcome {
            Err(_elapsed) => {
                warn!(
                    task_id = %task_id,
                    deadline = ?ctx.policy.hard_deadline,
                    "collector exceeded hard deadline"
                );
                fail(
                    ctx,
                    &task_id,
                    ErrorKind::Timeout,
                    format!(
                        "collector did not return within {:?}",
                        ctx.policy.hard_deadline
                    ),
                );
                return;
            }
            Ok(Ok(payload)) => {
                let _ = ctx.store.update(&task_id, |t| {
                    t.result = Some(payload);
                    t.progress = Some("Scan completed successfully".to_string());
                    t.transition(TaskStatus::Success)
                });
                info!(worker, task_id = %task_id, attempt, "task succeeded");
                return;
            }
            Ok(Err(err)) if !err.is_transient() => {
                fail(ctx, &task_id, ErrorKind::Permanent, err.message);
                return;
            }
            Ok(Err(err)) => {
                if ctx.store.cancel_requested(&task_id) {
                    fail(
                        ctx,
                        &task_id,
                        ErrorKind::Cancelled,
                        "cancelled; transient failure not retried",
                    );
                    return;
                }
                if attempt >= max_attempts {
                    fail(
                        ctx,
                        &task_id,
                        ErrorKind::RetriesExhausted,
                        format!(
                            "failed after {max_attempts} attempts: {}",
                            err.message
                        ),
                    );
                    return;
                }

                let backoff = backoff_for(&ctx.policy, attempt);
                debug!(
                    task_id = %task_id,
                    attempt,
                    backoff = ?backoff,
                    error = %err.message,
                    "transient failure, backing off"
                );
                if ctx
                    .store
                    .update(&task_id, |t| {
                        t.retry_count += 1;
                        t.progress = Some(format!(
                            "Transient failure: {}; retrying",
                            err.message
                        ));
                        t.transition(TaskStatus::Retry)
                    })
                    .is_err()
                {
                    return;
                }
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Exponential backoff before the `n`-th retry, capped at the policy max.
fn backoff_for(policy: &DispatchPolicy, failed_attempts: u32) -> Duration {
    let exponent = failed_attempts.saturating_sub(1).min(16);
    let backoff = policy.backoff_base.saturating_mul(1u32 << exponent);
    backoff.min(policy.backoff_max)
}

fn fail(
    ctx: &WorkerContext,
    task_id: &TaskId,
    kind: ErrorKind,
    message: impl Into<String>,
) {
    let message = message.into();
    warn!(task_id = %task_id, kind = %kind, error = %message, "task failed");
    let result = ctx.store.update(task_id, |t| {
        t.error = Some(TaskError::new(kind, message));
        t.progress = Some("Task failed".to_string());
        t.transition(TaskStatus::Failure)
    });
    if let Err(err) = result {
        warn!(task_id = %task_id, error = %err, "could not record task failure");
    }
}
