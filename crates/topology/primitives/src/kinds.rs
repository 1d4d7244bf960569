use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Subnet reachability class.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SubnetKind {
    /// No route to the internet in either direction.
    #[default]
    Isolated,
    /// Outbound-only internet access.
    Private,
    /// Directly addressable from the internet.
    Public,
}

impl SubnetKind {
    /// Whether subnets of this kind receive routes towards a peered segment.
    pub fn routes_via_peering(&self) -> bool {
        matches!(self, Self::Isolated | Self::Private)
    }
}

/// How clients resolve the service hostname behind an interface endpoint.
///
/// Only affects the probe's hostname rewrite; access control ignores it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DnsMode {
    #[default]
    PrivateEnabled,
    PrivateDisabled,
}

impl DnsMode {
    /// Clients must address the endpoint explicitly in the hostname.
    pub fn requires_host_rewrite(&self) -> bool {
        matches!(self, Self::PrivateDisabled)
    }
}
