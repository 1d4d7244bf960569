use isthmus_primitives::EndpointId;
use url::{Host, Url};

use crate::ProbeError;

/// Variable carrying the API base URL.
pub const API_URL_VAR: &str = "API_URL";
/// Variable carrying the endpoint id when private DNS is disabled.
pub const ENDPOINT_ID_VAR: &str = "VPC_ENDPOINT_ID";

/// What a probe calls, and through which endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub api_url: Url,
    /// Set when the endpoint has private DNS disabled; the hostname then has
    /// to name the endpoint explicitly.
    pub endpoint_id: Option<EndpointId>,
}

impl ProbeTarget {
    pub fn new(api_url: &str, endpoint_id: Option<EndpointId>) -> Result<Self, ProbeError> {
        Ok(Self {
            api_url: Url::parse(api_url)?,
            endpoint_id,
        })
    }

    /// Read [`API_URL_VAR`] and [`ENDPOINT_ID_VAR`] from the process environment.
    pub fn from_env() -> Result<Self, ProbeError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ProbeError> {
        let api_url = lookup(API_URL_VAR).ok_or(ProbeError::MissingVariable(API_URL_VAR))?;
        let endpoint_id = lookup(ENDPOINT_ID_VAR)
            .filter(|id| !id.is_empty())
            .map(EndpointId::new);
        Self::new(&api_url, endpoint_id)
    }

    /// URL actually requested.
    ///
    /// With an endpoint id, `{api}.execute-api.{region}.amazonaws.com` becomes
    /// `{api}-{endpoint_id}.execute-api.{region}.amazonaws.com`. Without one the
    /// URL is returned as is.
    pub fn rewrite_url(&self) -> Result<Url, ProbeError> {
        let Some(endpoint_id) = &self.endpoint_id else {
            return Ok(self.api_url.clone());
        };

        let host = match self.api_url.host() {
            Some(Host::Domain(host)) => host,
            Some(_) => {
                return Err(ProbeError::InvalidUrl(format!(
                    "{} has an IP host, cannot address endpoint {endpoint_id}",
                    self.api_url
                )));
            }
            None => return Err(ProbeError::InvalidUrl(format!("{} has no host", self.api_url))),
        };

        let rewritten = match host.split_once('.') {
            Some((first, rest)) => format!("{first}-{endpoint_id}.{rest}"),
            None => format!("{host}-{endpoint_id}"),
        };

        let mut url = self.api_url.clone();
        url.set_host(Some(&rewritten))?;
        Ok(url)
    }
}
