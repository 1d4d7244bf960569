use std::collections::BTreeMap;

use isthmus_primitives::{AccountId, SegmentId, TrustRoleId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Actions a trust role grants to the trusted account.
pub const PEERING_ACCEPT_ACTIONS: [&str; 2] = [
    "ec2:AcceptVpcPeeringConnection",
    "ec2:ModifyVpcPeeringConnectionOptions",
];

/// Grant published by an accepter segment allowing `trusted_account` to
/// accept peering requests on its behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRole {
    pub id: TrustRoleId,
    pub accepter: SegmentId,
    pub trusted_account: AccountId,
    pub actions: Vec<String>,
}

/// Published trust roles keyed by `(accepter segment, trusted account)`.
#[derive(Debug, Default, Clone)]
pub struct TrustRoleStore {
    roles: BTreeMap<(SegmentId, AccountId), TrustRole>,
}

impl TrustRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish (or return the already published) role for the pair.
    pub fn publish(&mut self, accepter: &SegmentId, trusted_account: &AccountId) -> &TrustRole {
        self.roles
            .entry((accepter.clone(), trusted_account.clone()))
            .or_insert_with(|| {
                let role = TrustRole {
                    id: TrustRoleId::new(format!("{accepter}/accept-peering/{trusted_account}")),
                    accepter: accepter.clone(),
                    trusted_account: trusted_account.clone(),
                    actions: PEERING_ACCEPT_ACTIONS.iter().map(|a| a.to_string()).collect(),
                };
                debug!(role = %role.id, "Published trust role");
                role
            })
    }

    pub fn find(&self, accepter: &SegmentId, trusted_account: &AccountId) -> Option<&TrustRole> {
        self.roles.get(&(accepter.clone(), trusted_account.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrustRole> {
        self.roles.values()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_is_idempotent() {
        let mut store = TrustRoleStore::new();
        let first = store.publish(&"connector".into(), &"222222222222".into()).clone();
        let second = store.publish(&"connector".into(), &"222222222222".into()).clone();

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(first.actions.len(), PEERING_ACCEPT_ACTIONS.len());
    }

    #[test]
    fn test_roles_are_scoped_per_account() {
        let mut store = TrustRoleStore::new();
        store.publish(&"connector".into(), &"222222222222".into());

        assert!(store.find(&"connector".into(), &"222222222222".into()).is_some());
        assert!(store.find(&"connector".into(), &"333333333333".into()).is_none());
        assert!(store.find(&"provider".into(), &"222222222222".into()).is_none());
    }
}
