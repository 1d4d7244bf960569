use std::collections::BTreeSet;
use std::sync::Arc;

use isthmus_primitives::{ApiId, EndpointId};
use isthmus_topology_registry::AccessEndpoint;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{PolicyError, ResourcePolicy, synthesize};

/// A published API and the policy currently attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedApi {
    pub id: ApiId,
    /// Bumped on every policy replacement.
    pub revision: u64,
    pub policy: ResourcePolicy,
}

impl ExposedApi {
    /// Identities admitted by the attached policy.
    pub fn bound_endpoint_ids(&self) -> &BTreeSet<EndpointId> {
        self.policy.authorized()
    }
}

#[derive(Debug)]
struct AccessState {
    external: BTreeSet<EndpointId>,
    current: Arc<ExposedApi>,
}

/// Serializes consumer registration against a single [`ExposedApi`].
///
/// Every change recomputes the policy from the full external set and swaps in
/// a new `Arc<ExposedApi>`; readers never see a half-updated policy.
#[derive(Debug)]
pub struct ApiAccess {
    own: AccessEndpoint,
    state: Mutex<AccessState>,
}

impl ApiAccess {
    pub fn new<'a>(
        api_id: ApiId,
        own: &AccessEndpoint,
        external: impl IntoIterator<Item = &'a EndpointId>,
    ) -> Result<Self, PolicyError> {
        let external: BTreeSet<EndpointId> = external.into_iter().cloned().collect();
        let policy = synthesize(own, &external)?;
        info!(api = %api_id, authorized = policy.authorized().len(), "Attached resource policy");

        Ok(Self {
            own: own.clone(),
            state: Mutex::new(AccessState {
                external,
                current: Arc::new(ExposedApi {
                    id: api_id,
                    revision: 0,
                    policy,
                }),
            }),
        })
    }

    pub fn current(&self) -> Arc<ExposedApi> {
        self.state.lock().current.clone()
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().current.revision
    }

    /// Admit a consumer endpoint.
    pub fn register_consumer(&self, id: EndpointId) -> Result<Arc<ExposedApi>, PolicyError> {
        let mut state = self.state.lock();
        if !state.external.insert(id.clone()) {
            return Ok(state.current.clone());
        }
        debug!(api = %state.current.id, endpoint = %id, "Registering consumer");
        self.replace(&mut state)
    }

    /// Revoke a consumer endpoint. Unknown ids leave the policy untouched.
    pub fn deregister_consumer(&self, id: &EndpointId) -> Result<Arc<ExposedApi>, PolicyError> {
        let mut state = self.state.lock();
        if !state.external.remove(id) {
            return Ok(state.current.clone());
        }
        debug!(api = %state.current.id, endpoint = %id, "Deregistering consumer");
        self.replace(&mut state)
    }

    /// Replace the external set only if nobody else changed the policy since
    /// `expected_revision` was read.
    pub fn compare_and_swap<'a>(
        &self,
        expected_revision: u64,
        external: impl IntoIterator<Item = &'a EndpointId>,
    ) -> Result<Arc<ExposedApi>, PolicyError> {
        let mut state = self.state.lock();
        let current = state.current.revision;
        if current != expected_revision {
            return Err(PolicyError::StaleRevision {
                api: state.current.id.clone(),
                expected: expected_revision,
                current,
            });
        }

        let external: BTreeSet<EndpointId> = external.into_iter().cloned().collect();
        if external == state.external {
            return Ok(state.current.clone());
        }
        state.external = external;
        self.replace(&mut state)
    }

    fn replace(&self, state: &mut AccessState) -> Result<Arc<ExposedApi>, PolicyError> {
        let policy = synthesize(&self.own, &state.external)?;
        let next = Arc::new(ExposedApi {
            id: state.current.id.clone(),
            revision: state.current.revision + 1,
            policy,
        });
        info!(
            api = %next.id,
            revision = next.revision,
            authorized = next.policy.authorized().len(),
            "Replaced resource policy"
        );
        state.current = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use assert_matches::assert_matches;
    use isthmus_primitives::DnsMode;
    use isthmus_topology_registry::{EndpointBinding, EndpointKey};

    use super::*;

    fn own() -> AccessEndpoint {
        AccessEndpoint {
            key: EndpointKey::new("provider", "execute-api"),
            dns_mode: DnsMode::PrivateEnabled,
            binding: EndpointBinding::Bound("vpce-p".into()),
        }
    }

    fn access(external: &[&str]) -> ApiAccess {
        let external: Vec<EndpointId> = external.iter().map(|id| EndpointId::from(*id)).collect();
        ApiAccess::new("api-1".into(), &own(), &external).unwrap()
    }

    #[test]
    fn test_register_then_deregister_restores_policy() {
        let access = access(&["vpce-c"]);
        let before = access.current();

        let added = access.register_consumer("vpce-x".into()).unwrap();
        assert!(added.bound_endpoint_ids().contains(&"vpce-x".into()));
        assert_eq!(added.revision, before.revision + 1);

        let removed = access.deregister_consumer(&"vpce-x".into()).unwrap();
        assert_eq!(removed.policy, before.policy);
        assert_eq!(removed.bound_endpoint_ids(), before.bound_endpoint_ids());
        assert_eq!(removed.revision, before.revision + 2);
    }

    #[test]
    fn test_noop_changes_keep_revision() {
        let access = access(&["vpce-c"]);
        access.register_consumer("vpce-c".into()).unwrap();
        access.deregister_consumer(&"vpce-unknown".into()).unwrap();
        assert_eq!(access.revision(), 0);
    }

    #[test]
    fn test_compare_and_swap_rejects_stale_revision() {
        let access = access(&[]);
        access.register_consumer("vpce-a".into()).unwrap();

        let replacement = [EndpointId::from("vpce-b")];
        assert_matches!(
            access.compare_and_swap(0, &replacement),
            Err(PolicyError::StaleRevision { expected: 0, current: 1, .. })
        );

        let swapped = access.compare_and_swap(1, &replacement).unwrap();
        assert_eq!(swapped.revision, 2);
        let expected: BTreeSet<EndpointId> = ["vpce-p", "vpce-b"].into_iter().map(EndpointId::from).collect();
        assert_eq!(swapped.bound_endpoint_ids(), &expected);
    }

    #[test]
    fn test_pending_own_endpoint_fails() {
        let mut pending = own();
        pending.binding = EndpointBinding::Pending;
        let none: [&EndpointId; 0] = [];
        assert_matches!(
            ApiAccess::new("api-1".into(), &pending, none),
            Err(PolicyError::EndpointNotBound(_))
        );
    }

    #[test]
    fn test_concurrent_registrations_reach_union() {
        let access = Arc::new(access(&[]));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let access = access.clone();
                thread::spawn(move || {
                    access
                        .register_consumer(EndpointId::new(format!("vpce-{i}")))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let current = access.current();
        assert_eq!(current.revision, 8);
        assert_eq!(current.bound_endpoint_ids().len(), 9);
        for i in 0..8 {
            assert!(current.policy.is_authorized(&EndpointId::new(format!("vpce-{i}"))));
        }
    }
}
