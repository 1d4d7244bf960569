use isthmus_primitives::{AccountId, LinkId, Placement, Region, SegmentId, TrustRoleId};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::PeeringError;

/// Link lifecycle as reported by the provisioning engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum LinkState {
    /// Requested by the requester, not yet accepted.
    #[default]
    Requested,
    Active,
    Failed,
}

impl LinkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Active | Self::Failed)
    }
}

/// Directional peering: the requester initiates, the accepter accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringLink {
    pub id: LinkId,
    pub requester: SegmentId,
    pub accepter: SegmentId,
    pub accepter_region: Region,
    pub accepter_account: AccountId,
    /// Present whenever the link crosses an account or region boundary.
    pub trust_role: Option<TrustRoleId>,
    pub state: LinkState,
}

impl PeeringLink {
    /// Deterministic id so re-running the resolver addresses the same link.
    pub fn id_for(requester: &SegmentId, accepter: &SegmentId) -> LinkId {
        LinkId::new(format!("{requester}->{accepter}"))
    }

    pub fn accepter_placement(&self) -> Placement {
        Placement {
            account: self.accepter_account.clone(),
            region: self.accepter_region.clone(),
        }
    }

    /// Apply an engine-reported state. Only `Requested -> Active | Failed`
    /// moves are allowed; reporting the current state again is a no-op.
    pub fn transition(&mut self, to: LinkState) -> Result<(), PeeringError> {
        match (self.state, to) {
            (from, to) if from == to => Ok(()),
            (LinkState::Requested, LinkState::Active | LinkState::Failed) => {
                debug!(link = %self.id, from = %self.state, %to, "Link state changed");
                self.state = to;
                Ok(())
            }
            (from, to) => Err(PeeringError::InvalidLinkTransition {
                link: self.id.clone(),
                from,
                to,
            }),
        }
    }
}
