use isthmus_primitives::SegmentId;
use isthmus_topology_registry::{Segment, SegmentRegistry};
use tracing::{debug, info};

use crate::{LinkState, PeeringError, PeeringLink, Route, TrustRoleStore};

/// A resolved link and the requester-side routes that ride on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkResolution {
    pub link: PeeringLink,
    pub routes: Vec<Route>,
}

/// Computes links over a frozen segment registry and the published trust roles.
#[derive(Debug, Clone, Copy)]
pub struct PeeringResolver<'a> {
    segments: &'a SegmentRegistry,
    trust: &'a TrustRoleStore,
}

impl<'a> PeeringResolver<'a> {
    pub fn new(segments: &'a SegmentRegistry, trust: &'a TrustRoleStore) -> Self {
        Self { segments, trust }
    }

    /// Resolve `requester -> accepter`.
    ///
    /// All preconditions are checked before anything is produced, so a failed
    /// call never yields a partial route set.
    pub fn link(
        &self,
        requester: &SegmentId,
        accepter: &SegmentId,
    ) -> Result<LinkResolution, PeeringError> {
        let requester = self.segments.resolve(requester)?;
        let accepter = self.segments.resolve(accepter)?;

        if requester.id == accepter.id {
            return Err(PeeringError::SelfPeering(requester.id.clone()));
        }
        if requester.cidr.overlaps(&accepter.cidr) {
            return Err(PeeringError::OverlappingCidr {
                requester: requester.id.clone(),
                requester_cidr: requester.cidr,
                accepter: accepter.id.clone(),
                accepter_cidr: accepter.cidr,
            });
        }

        let same_boundary = requester.placement == accepter.placement;
        let trust_role = if same_boundary {
            None
        } else {
            let role = self
                .trust
                .find(&accepter.id, &requester.placement.account)
                .ok_or_else(|| PeeringError::MissingTrustRole {
                    accepter: accepter.id.clone(),
                    requester_account: requester.placement.account.clone(),
                })?;
            Some(role.id.clone())
        };

        let link = PeeringLink {
            id: PeeringLink::id_for(&requester.id, &accepter.id),
            requester: requester.id.clone(),
            accepter: accepter.id.clone(),
            accepter_region: accepter.placement.region.clone(),
            accepter_account: accepter.placement.account.clone(),
            trust_role,
            state: LinkState::Requested,
        };
        let routes = routes_towards(&requester, &accepter, &link);

        info!(
            link = %link.id,
            cross_boundary = !same_boundary,
            routes = routes.len(),
            "Resolved peering link"
        );
        Ok(LinkResolution { link, routes })
    }

    /// Accepter-side routes back to the requester over an existing link.
    ///
    /// Never produced by [`link`](Self::link); callers opt in explicitly.
    pub fn return_routes(&self, link: &PeeringLink) -> Result<Vec<Route>, PeeringError> {
        let requester = self.segments.resolve(&link.requester)?;
        let accepter = self.segments.resolve(&link.accepter)?;
        let routes = routes_towards(&accepter, &requester, link);
        debug!(link = %link.id, routes = routes.len(), "Resolved return routes");
        Ok(routes)
    }
}

fn routes_towards(from: &Segment, to: &Segment, link: &PeeringLink) -> Vec<Route> {
    from.routable_subnets()
        .map(|subnet| Route {
            subnet_id: subnet.id.clone(),
            route_table_id: subnet.route_table_id.clone(),
            destination_cidr: to.cidr,
            via_link: link.id.clone(),
        })
        .collect()
}
