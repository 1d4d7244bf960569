use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use hickory_resolver::TokioResolver;
use serde::Serialize;
use tracing::{debug, info};

use crate::{ProbeError, ProbeTarget};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// What the API answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResponse {
    pub url: String,
    pub resolved: Vec<IpAddr>,
    pub status: u16,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Resolves the target host, then issues a single GET.
#[derive(Debug, Clone)]
pub struct Prober {
    client: reqwest::Client,
}

impl Prober {
    pub fn new() -> Result<Self, ProbeError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Http {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub async fn run(&self, target: &ProbeTarget) -> Result<ProbeResponse, ProbeError> {
        let url = target.rewrite_url()?;
        let host = url
            .host_str()
            .ok_or_else(|| ProbeError::InvalidUrl(format!("{url} has no host")))?;

        let resolved = lookup(host).await?;
        debug!(%host, ?resolved, "Resolved probe host");

        let http_error = |e: reqwest::Error| ProbeError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await.map_err(http_error)?;

        info!(%url, status, "Probe finished");
        Ok(ProbeResponse {
            url: url.to_string(),
            resolved,
            status,
            body,
            headers,
        })
    }
}

async fn lookup(host: &str) -> Result<Vec<IpAddr>, ProbeError> {
    // `host_str` brackets IPv6 literals
    if let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    let dns_error = |reason: String| ProbeError::DnsLookup {
        host: host.to_owned(),
        reason,
    };
    // System configuration, so endpoint-private zones resolve inside the network.
    let resolver = TokioResolver::builder_tokio()
        .map_err(|e| dns_error(e.to_string()))?
        .build();
    let lookup = resolver
        .lookup_ip(host)
        .await
        .map_err(|e| dns_error(e.to_string()))?;

    Ok(lookup.iter().collect())
}
