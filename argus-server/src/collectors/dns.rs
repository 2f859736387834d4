use async_trait::async_trait;
use serde_json::{Value, json};

use argus_core::{Collector, CollectorContext, CollectorError};

/// Forward DNS resolution via the system resolver.
#[derive(Debug, Default)]
pub struct DnsCollector;

#[async_trait]
impl Collector for DnsCollector {
    fn describe(&self) -> &str {
        "Resolve A/AAAA records for a domain via the system resolver"
    }

    async fn collect(
        &self,
        target: &str,
        _ctx: &CollectorContext,
    ) -> Result<Value, CollectorError> {
        // lookup_host needs a port; it is discarded from the results.
        let addrs = tokio::net::lookup_host((target, 0)).await.map_err(|e| {
            CollectorError::permanent(format!("could not resolve {target}: {e}"))
        })?;

        let mut v4 = Vec::new();
        let mut v6 = Vec::new();
        for addr in addrs {
            match addr.ip() {
                std::net::IpAddr::V4(ip) => v4.push(ip.to_string()),
                std::net::IpAddr::V6(ip) => v6.push(ip.to_string()),
            }
        }
        v4.sort();
        v4.dedup();
        v6.sort();
        v6.dedup();

        Ok(json!({
            "collector": "dns",
            "target": target,
            "records": { "A": v4, "AAAA": v6 },
        }))
    }
}
