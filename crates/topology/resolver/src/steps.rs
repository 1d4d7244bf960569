//! Deterministic step ids. Re-running the resolver on the same description
//! yields the same ids, which is what lets a re-run skip completed steps.

use isthmus_primitives::{AccountId, ApiId, IntentId, LinkId, SegmentId, SubnetId};
use isthmus_topology_registry::EndpointKey;

pub fn segment(id: &SegmentId) -> IntentId {
    IntentId::new(format!("segment:{id}"))
}

pub fn endpoint(key: &EndpointKey) -> IntentId {
    IntentId::new(format!("endpoint:{key}"))
}

pub fn trust_role(accepter: &SegmentId, trusted_account: &AccountId) -> IntentId {
    IntentId::new(format!("trust-role:{accepter}/{trusted_account}"))
}

pub fn peering(link: &LinkId) -> IntentId {
    IntentId::new(format!("peering:{link}"))
}

pub fn route(subnet: &SubnetId, link: &LinkId) -> IntentId {
    IntentId::new(format!("route:{subnet}@{link}"))
}

pub fn ingress(endpoint: &EndpointKey, source: &SegmentId) -> IntentId {
    IntentId::new(format!("ingress:{endpoint}<-{source}"))
}

pub fn policy(api: &ApiId) -> IntentId {
    IntentId::new(format!("policy:{api}"))
}

pub fn api(api: &ApiId) -> IntentId {
    IntentId::new(format!("api:{api}"))
}

pub fn probe(segment: &SegmentId) -> IntentId {
    IntentId::new(format!("probe:{segment}"))
}
