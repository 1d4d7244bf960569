use isthmus_primitives::{AccountId, Cidr, LinkId, SegmentId};
use isthmus_topology_registry::RegistryError;

use crate::LinkState;

/// Errors from link resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeeringError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("segment {0} cannot peer with itself")]
    SelfPeering(SegmentId),
    #[error(
        "peered segments overlap: {requester} ({requester_cidr}) and {accepter} ({accepter_cidr})"
    )]
    OverlappingCidr {
        requester: SegmentId,
        requester_cidr: Cidr,
        accepter: SegmentId,
        accepter_cidr: Cidr,
    },
    #[error("segment {accepter} has no trust role for account {requester_account}")]
    MissingTrustRole {
        accepter: SegmentId,
        requester_account: AccountId,
    },
    #[error("link {link} cannot move from {from} to {to}")]
    InvalidLinkTransition {
        link: LinkId,
        from: LinkState,
        to: LinkState,
    },
}
