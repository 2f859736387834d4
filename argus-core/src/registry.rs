//! The collector boundary: the only contract this layer holds against the
//! excluded data-gathering subsystem.
//!
//! A [`Collector`] is an opaque unit of work resolved by scan-type string
//! from a registry that is populated once at process start and immutable
//! afterwards. Unknown keys are a typed admission error, never a crash.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use argus_model::CollectorInfo;

/// How the dispatcher should treat a collector failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network blip, upstream 5xx; worth retrying.
    Transient,
    /// Bad target, upstream 4xx, validation; retrying cannot help.
    Permanent,
}

/// Failure reported across the collector boundary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct CollectorError {
    pub kind: FailureKind,
    pub message: String,
}

impl CollectorError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// Deadline context handed to every collector invocation.
///
/// `wrap_up` fires at the soft deadline or on a cancellation request; a
/// collector that honors it should return early with whatever it has. The
/// hard deadline is enforced outside the collector and needs no
/// cooperation.
#[derive(Debug, Clone)]
pub struct CollectorContext {
    wrap_up: CancellationToken,
    soft_deadline: Duration,
}

impl CollectorContext {
    pub fn new(wrap_up: CancellationToken, soft_deadline: Duration) -> Self {
        Self {
            wrap_up,
            soft_deadline,
        }
    }

    /// Resolves when the collector should stop gathering and return.
    pub async fn wrap_up(&self) {
        self.wrap_up.cancelled().await
    }

    pub fn wrap_up_requested(&self) -> bool {
        self.wrap_up.is_cancelled()
    }

    pub fn soft_deadline(&self) -> Duration {
        self.soft_deadline
    }
}

/// One opaque unit of scan work.
///
/// Implementations must be safely re-invocable: a retry after a transient
/// failure may run the same target again.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Human-readable one-liner for the collector listing.
    fn describe(&self) -> &str;

    async fn collect(
        &self,
        target: &str,
        ctx: &CollectorContext,
    ) -> Result<Value, CollectorError>;
}

struct RegistryEntry {
    cost: u64,
    collector: Arc<dyn Collector>,
}

/// Immutable map from scan-type string to collector and credit cost.
pub struct CollectorRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("scan_types", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CollectorRegistry {
    pub fn builder() -> CollectorRegistryBuilder {
        CollectorRegistryBuilder {
            entries: HashMap::new(),
        }
    }

    pub fn cost_of(&self, scan_type: &str) -> Option<u64> {
        self.entries.get(scan_type).map(|e| e.cost)
    }

    pub fn resolve(&self, scan_type: &str) -> Option<Arc<dyn Collector>> {
        self.entries.get(scan_type).map(|e| e.collector.clone())
    }

    pub fn contains(&self, scan_type: &str) -> bool {
        self.entries.contains_key(scan_type)
    }

    /// Listing for `GET /collectors`, sorted for stable output.
    pub fn list(&self) -> Vec<CollectorInfo> {
        let mut infos: Vec<CollectorInfo> = self
            .entries
            .iter()
            .map(|(scan_type, entry)| CollectorInfo {
                scan_type: scan_type.clone(),
                cost: entry.cost,
                description: entry.collector.describe().to_string(),
            })
            .collect();
        infos.sort_by(|a, b| a.scan_type.cmp(&b.scan_type));
        infos
    }
}

pub struct CollectorRegistryBuilder {
    entries: HashMap<String, RegistryEntry>,
}

impl CollectorRegistryBuilder {
    pub fn register(
        mut self,
        scan_type: impl Into<String>,
        cost: u64,
        collector: Arc<dyn Collector>,
    ) -> Self {
        self.entries
            .insert(scan_type.into(), RegistryEntry { cost, collector });
        self
    }

    pub fn build(self) -> CollectorRegistry {
        CollectorRegistry {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoCollector;

    #[async_trait]
    impl Collector for EchoCollector {
        fn describe(&self) -> &str {
            "echoes the target back"
        }

        async fn collect(
            &self,
            target: &str,
            _ctx: &CollectorContext,
        ) -> Result<Value, CollectorError> {
            Ok(json!({ "target": target }))
        }
    }

    #[test]
    fn resolve_and_cost_by_scan_type() {
        let registry = CollectorRegistry::builder()
            .register("echo", 5, Arc::new(EchoCollector))
            .build();

        assert_eq!(registry.cost_of("echo"), Some(5));
        assert!(registry.resolve("echo").is_some());
        assert_eq!(registry.cost_of("nope"), None);
        assert!(registry.resolve("nope").is_none());
    }

    #[test]
    fn listing_is_sorted_and_described() {
        let registry = CollectorRegistry::builder()
            .register("whois", 5, Arc::new(EchoCollector))
            .register("dns", 5, Arc::new(EchoCollector))
            .build();

        let listing = registry.list();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].scan_type, "dns");
        assert_eq!(listing[1].scan_type, "whois");
        assert_eq!(listing[0].description, "echoes the target back");
    }

    #[tokio::test]
    async fn context_reports_wrap_up() {
        let token = CancellationToken::new();
        let ctx = CollectorContext::new(token.clone(), Duration::from_secs(5));
        assert!(!ctx.wrap_up_requested());
        token.cancel();
        assert!(ctx.wrap_up_requested());
        // Resolves immediately once fired.
        ctx.wrap_up().await;
    }
}
