use isthmus_primitives::ApiId;
use isthmus_topology_registry::EndpointKey;

/// Errors from policy synthesis and replacement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("endpoint {0} is not bound; retry once provisioning completes")]
    EndpointNotBound(EndpointKey),
    #[error("policy of {api} moved to revision {current}, expected {expected}")]
    StaleRevision {
        api: ApiId,
        expected: u64,
        current: u64,
    },
}
