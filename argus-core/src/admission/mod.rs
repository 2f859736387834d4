//! Admission control: the all-or-nothing gate in front of the queue.
//!
//! Order matters and is load-bearing: the rate check runs before any
//! ledger work and has no side effect on it; the cost lookup rejects
//! unknown scan types before any reservation; the reservation itself is
//! the only mutation, and only a successful one is followed by task
//! creation and enqueue. A rejected submission leaves no trace.

pub mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use argus_model::{AccountId, TaskRecord, TaskView};

use crate::dispatch::Dispatcher;
use crate::ledger::{Ledger, LedgerError};
use crate::registry::CollectorRegistry;
use crate::store::TaskStore;

pub use rate_limit::{RateLimitPolicy, SlidingWindowLimiter};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("rate limit exceeded, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("unknown scan type {scan_type:?}")]
    UnknownCollector { scan_type: String },

    #[error("account not found")]
    UnknownAccount,

    #[error("account is inactive")]
    AccountInactive,

    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: u64, available: u64 },
}

impl From<LedgerError> for AdmissionError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownAccount => AdmissionError::UnknownAccount,
            LedgerError::AccountInactive => AdmissionError::AccountInactive,
            LedgerError::InsufficientCredits {
                required,
                available,
            } => AdmissionError::InsufficientCredits {
                required,
                available,
            },
        }
    }
}

/// Successful admission. The task id is the caller's only guaranteed
/// observable side effect; all further progress is asynchronous.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub task: TaskView,
    pub cost: u64,
    pub credits_remaining: u64,
}

pub struct AdmissionController {
    ledger: Arc<Ledger>,
    registry: Arc<CollectorRegistry>,
    store: Arc<TaskStore>,
    dispatcher: Dispatcher,
    limiter: SlidingWindowLimiter,
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController").finish_non_exhaustive()
    }
}

impl AdmissionController {
    pub fn new(
        policy: RateLimitPolicy,
        ledger: Arc<Ledger>,
        registry: Arc<CollectorRegistry>,
        store: Arc<TaskStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            ledger,
            registry,
            store,
            dispatcher,
            limiter: SlidingWindowLimiter::new(policy),
        }
    }

    /// Decide whether `account_id` may spend credits on a scan, and if so
    /// queue it. Synchronous end to end; no lock is held across any other
    /// component's call.
    pub fn admit(
        &self,
        account_id: AccountId,
        scan_type: &str,
        target: &str,
    ) -> Result<Admitted, AdmissionError> {
        if let Err(retry_after) = self.limiter.check(account_id) {
            debug!(account_id = %account_id, "submission rate limited");
            return Err(AdmissionError::RateLimited { retry_after });
        }

        let cost = self.registry.cost_of(scan_type).ok_or_else(|| {
            AdmissionError::UnknownCollector {
                scan_type: scan_type.to_string(),
            }
        })?;

        let credits_remaining = self.ledger.reserve(&account_id, cost)?;

        let record = TaskRecord::new(account_id, scan_type, target);
        let task = record.view();
        let task_id = record.task_id;

        self.store.insert(record);
        self.dispatcher.enqueue(task_id);

        info!(
            task_id = %task_id,
            account_id = %account_id,
            scan_type,
            cost,
            credits_remaining,
            "scan admitted"
        );

        Ok(Admitted {
            task,
            cost,
            credits_remaining,
        })
    }
}
