//! Admission and orchestration core for the Argus scan service.
//!
//! The crate holds the five engineered components that sit between the
//! HTTP surface and the external collectors:
//!
//! - [`ledger::Ledger`] — authoritative credit balances with an atomic
//!   reserve operation
//! - [`admission::AdmissionController`] — rate check plus reservation in
//!   front of the queue
//! - [`store::TaskStore`] — keyed task lifecycle state, publish-on-write
//! - [`dispatch::Dispatcher`] — bounded worker pool with retry, timeout,
//!   and cooperative cancellation
//! - [`notify::TaskNotifier`] — per-task broadcast fan-out for live
//!   subscribers
//!
//! Collectors themselves are opaque: the crate only defines the
//! [`registry::Collector`] boundary they are invoked through.

pub mod admission;
pub mod dispatch;
pub mod ledger;
pub mod notify;
pub mod registry;
pub mod store;

pub use admission::{
    Admitted, AdmissionController, AdmissionError, RateLimitPolicy,
    SlidingWindowLimiter,
};
pub use dispatch::{DispatchPolicy, Dispatcher};
pub use ledger::{Account, Ledger, LedgerError};
pub use notify::{NotifyPolicy, TaskNotifier, TransitionPublisher};
pub use registry::{
    Collector, CollectorContext, CollectorError, CollectorRegistry,
    CollectorRegistryBuilder, FailureKind,
};
pub use store::{CancelError, Lookup, RetentionPolicy, TaskStore, UpdateError};
