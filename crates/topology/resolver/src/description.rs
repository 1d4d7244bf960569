//! Declarative topology input.
//!
//! ```toml
//! name = "private-api"
//!
//! [[segment]]
//! id = "provider"
//! cidr = "10.2.0.0/16"
//! account = "111111111111"
//! region = "us-east-2"
//!
//! [[endpoint]]
//! segment = "provider"
//!
//! [[peering]]
//! from = "consumer"
//! to = "connector"
//!
//! [api]
//! name = "hello"
//! segment = "provider"
//! authorized = ["connector"]
//! ```

use std::path::Path;

use isthmus_primitives::{AccountId, DnsMode, SegmentId, ServiceName};
use isthmus_topology_registry::SegmentDecl;
use serde::{Deserialize, Serialize};

use crate::ResolveError;

/// Service every API-facing endpoint targets.
pub const API_SERVICE: &str = "execute-api";

/// Port a peered requester may reach an accepter's endpoints on.
pub const HTTPS_PORT: u16 = 443;

/// Action a probe is granted on the exposed API.
pub const INVOKE_ACTION: &str = "execute-api:Invoke";

fn api_service() -> ServiceName {
    ServiceName::from(API_SERVICE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyDescription {
    pub name: String,
    #[serde(default, rename = "segment")]
    pub segments: Vec<SegmentDecl>,
    #[serde(default, rename = "endpoint")]
    pub endpoints: Vec<EndpointDecl>,
    #[serde(default, rename = "trust_role")]
    pub trust_roles: Vec<TrustRoleDecl>,
    #[serde(default, rename = "peering")]
    pub peerings: Vec<PeeringDecl>,
    #[serde(default)]
    pub api: Option<ApiDecl>,
    #[serde(default, rename = "probe")]
    pub probes: Vec<ProbeDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointDecl {
    pub segment: SegmentId,
    #[serde(default = "api_service")]
    pub service: ServiceName,
    #[serde(default)]
    pub dns: DnsMode,
}

/// Grant on `segment` letting `trusted_account` accept peering requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustRoleDecl {
    pub segment: SegmentId,
    pub trusted_account: AccountId,
    /// Peerings the role can only be published over. A role published over
    /// the very link that needs it can never be bootstrapped.
    #[serde(default)]
    pub published_over: Vec<PeeringDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeeringDecl {
    /// Requester.
    pub from: SegmentId,
    /// Accepter.
    pub to: SegmentId,
    /// Also route the accepter's subnets back to the requester.
    #[serde(default)]
    pub return_routes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiDecl {
    pub name: String,
    /// Provider segment; its own `execute-api` endpoint is always authorized.
    pub segment: SegmentId,
    /// Segments whose `execute-api` endpoints may invoke the API.
    #[serde(default)]
    pub authorized: Vec<SegmentId>,
}

/// Connectivity probe running inside `segment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeDecl {
    pub segment: SegmentId,
    /// Segment whose endpoint the probe goes through.
    #[serde(default)]
    pub via_endpoint: Option<SegmentId>,
}

impl TopologyDescription {
    pub fn from_toml(input: &str) -> Result<Self, ResolveError> {
        toml::from_str(input).map_err(|err| ResolveError::Description(err.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ResolveError> {
        let input = std::fs::read_to_string(path).map_err(|err| {
            ResolveError::Description(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml(&input)
    }
}
