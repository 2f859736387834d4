//! Reference collectors: thin calls into the network, registered behind
//! the opaque [`Collector`] boundary the core dispatches through. Nothing
//! here carries algorithmic weight; richer collectors live outside this
//! service entirely.

pub mod crtsh;
pub mod dns;
pub mod whois;

use std::sync::Arc;

use argus_core::CollectorRegistry;

pub use crtsh::CrtshCollector;
pub use dns::DnsCollector;
pub use whois::WhoisCollector;

/// Registry with the built-in collectors and their credit costs.
pub fn default_registry() -> CollectorRegistry {
    CollectorRegistry::builder()
        .register("dns", 5, Arc::new(DnsCollector))
        .register("whois", 5, Arc::new(WhoisCollector::default()))
        .register("crtsh", 10, Arc::new(CrtshCollector::new()))
        .build()
}
