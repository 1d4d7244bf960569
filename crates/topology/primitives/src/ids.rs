//! Opaque string identifiers.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(
                Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
                From,
            )]
            #[serde(transparent)]
            #[display("{_0}")]
            pub struct $name(String);

            impl $name {
                pub fn new(id: impl Into<String>) -> Self {
                    Self(id.into())
                }

                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl From<&str> for $name {
                fn from(id: &str) -> Self {
                    Self(id.to_owned())
                }
            }

            impl AsRef<str> for $name {
                fn as_ref(&self) -> &str {
                    &self.0
                }
            }
        )+
    };
}

string_id! {
    /// Declared network segment.
    SegmentId,
    /// Subnet within a segment, `{segment}/{group}-{az}`.
    SubnetId,
    /// Route table owned by one subnet.
    RouteTableId,
    /// Identity the provisioning engine assigns to an interface endpoint.
    ///
    /// Treated as an opaque token; it is only ever matched, never parsed.
    EndpointId,
    /// Peering link between two segments.
    LinkId,
    /// Published trust role allowing a foreign account to accept peering.
    TrustRoleId,
    /// Exposed API.
    ApiId,
    /// Resource intent / construction step.
    IntentId,
    /// Cloud account.
    AccountId,
    /// Cloud region.
    Region,
    /// Service reached through an interface endpoint (e.g. `execute-api`).
    ServiceName,
    /// Generic engine-assigned resource identifier (network id, route id, ...).
    ResourceId,
    /// Engine-assigned trust role reference.
    RoleArn,
    /// Base URL of the exposed API.
    ApiUrl,
    /// Invocation scope of the exposed API, granted to callers.
    ExecuteArn,
    /// Rendered resource policy document (JSON).
    PolicyDocument,
}
