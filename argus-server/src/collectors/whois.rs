use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use argus_core::{Collector, CollectorContext, CollectorError};

const IANA_WHOIS: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;

/// WHOIS lookup over port 43: query IANA, follow one `refer:` hop to the
/// registry responsible for the TLD.
#[derive(Debug)]
pub struct WhoisCollector {
    root_server: String,
}

impl Default for WhoisCollector {
    fn default() -> Self {
        Self {
            root_server: IANA_WHOIS.to_string(),
        }
    }
}

#[async_trait]
impl Collector for WhoisCollector {
    fn describe(&self) -> &str {
        "WHOIS registration data for a domain, following one registry referral"
    }

    async fn collect(
        &self,
        target: &str,
        ctx: &CollectorContext,
    ) -> Result<Value, CollectorError> {
        let root = query(&self.root_server, target, ctx).await?;

        let referral = referral_server(&root);
        let (server, raw) = match referral {
            Some(server) if server != self.root_server => {
                match query(&server, target, ctx).await {
                    Ok(body) => (server, body),
                    // The root answer is still useful when the referral
                    // target is unreachable.
                    Err(_) => (self.root_server.clone(), root),
                }
            }
            _ => (self.root_server.clone(), root),
        };

        Ok(json!({
            "collector": "whois",
            "target": target,
            "server": server,
            "raw": raw,
        }))
    }
}

async fn query(
    server: &str,
    target: &str,
    ctx: &CollectorContext,
) -> Result<String, CollectorError> {
    let io = async {
        let mut stream = TcpStream::connect((server, WHOIS_PORT)).await?;
        stream.write_all(target.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        Ok::<_, std::io::Error>(String::from_utf8_lossy(&response).into_owned())
    };

    tokio::select! {
        result = io => result.map_err(|e| {
            CollectorError::transient(format!("whois query to {server} failed: {e}"))
        }),
        _ = ctx.wrap_up() => Err(CollectorError::transient(
            "whois query abandoned at wrap-up signal",
        )),
    }
}

fn referral_server(response: &str) -> Option<String> {
    response.lines().find_map(|line| {
        let line = line.trim();
        let rest = line
            .strip_prefix("refer:")
            .or_else(|| line.strip_prefix("whois:"))?;
        let server = rest.trim();
        (!server.is_empty()).then(|| server.to_string())
    })
}
