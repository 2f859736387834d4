use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use argus_core::{Collector, CollectorContext, CollectorError};

const CRTSH_URL: &str = "https://crt.sh/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Subdomain discovery from Certificate Transparency logs via crt.sh.
#[derive(Debug)]
pub struct CrtshCollector {
    client: reqwest::Client,
}

impl CrtshCollector {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("argus/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for CrtshCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for CrtshCollector {
    fn describe(&self) -> &str {
        "Discover subdomains from Certificate Transparency logs (crt.sh)"
    }

    async fn collect(
        &self,
        target: &str,
        ctx: &CollectorContext,
    ) -> Result<Value, CollectorError> {
        let request = self
            .client
            .get(CRTSH_URL)
            .query(&[("q", format!("%.{target}")), ("output", "json".into())])
            .send();

        let response = tokio::select! {
            result = request => result.map_err(|e| {
                // CT log queries fail transiently under load.
                CollectorError::transient(format!("crt.sh request failed: {e}"))
            })?,
            _ = ctx.wrap_up() => {
                return Err(CollectorError::transient(
                    "crt.sh query abandoned at wrap-up signal",
                ));
            }
        };

        let status = response.status();
        if status.is_server_error() {
            return Err(CollectorError::transient(format!(
                "crt.sh returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(CollectorError::permanent(format!(
                "crt.sh rejected the query with {status}"
            )));
        }

        let certificates: Vec<Value> = response.json().await.map_err(|e| {
            CollectorError::transient(format!("invalid JSON from crt.sh: {e}"))
        })?;

        let subdomains = extract_subdomains(&certificates, target);
        Ok(json!({
            "collector": "crtsh",
            "target": target,
            "certificates_found": certificates.len(),
            "subdomains": subdomains,
            "total_count": subdomains.len(),
        }))
    }
}

/// Pull hostnames under `target` out of certificate name fields,
/// deduplicated and sorted.
fn extract_subdomains(certificates: &[Value], target: &str) -> Vec<String> {
    let suffix = format!(".{}", target.to_ascii_lowercase());
    let mut found = BTreeSet::new();

    for cert in certificates {
        for field in ["name_value", "common_name"] {
            let Some(names) = cert.get(field).and_then(Value::as_str) else {
                continue;
            };
            for name in names.lines() {
                let name =
                    name.trim().trim_start_matches("*.").to_ascii_lowercase();
                if name.ends_with(&suffix) || name == target {
                    found.insert(name);
                }
            }
        }
    }

    found.into_iter().collect()
}
