//! Interface endpoints and their engine-assigned identities.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use isthmus_primitives::{DnsMode, EndpointId, SegmentId, ServiceName};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RegistryError, SegmentRegistry};

/// Local handle for an endpoint, known before the engine assigns an identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    pub segment: SegmentId,
    pub service: ServiceName,
}

impl EndpointKey {
    pub fn new(segment: impl Into<SegmentId>, service: impl Into<ServiceName>) -> Self {
        Self {
            segment: segment.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.service)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "kebab-case")]
pub enum EndpointBinding {
    /// Placeholder until the provisioning engine reports an identity.
    #[default]
    Pending,
    Bound(EndpointId),
}

impl EndpointBinding {
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }

    pub fn id(&self) -> Option<&EndpointId> {
        match self {
            Self::Bound(id) => Some(id),
            Self::Pending => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEndpoint {
    pub key: EndpointKey,
    pub dns_mode: DnsMode,
    pub binding: EndpointBinding,
}

impl AccessEndpoint {
    /// The bound identity, or [`RegistryError::EndpointNotBound`] while pending.
    pub fn identity(&self) -> Result<&EndpointId, RegistryError> {
        self.binding
            .id()
            .ok_or_else(|| RegistryError::EndpointNotBound(self.key.clone()))
    }

    pub fn segment(&self) -> &SegmentId {
        &self.key.segment
    }
}

/// Endpoints per (segment, service).
///
/// Bindings arrive concurrently from the executor, so entries sit behind a
/// `RwLock`; the segment registry itself is frozen and shared read-only.
#[derive(Debug)]
pub struct EndpointRegistry {
    segments: Arc<SegmentRegistry>,
    endpoints: RwLock<BTreeMap<EndpointKey, AccessEndpoint>>,
}

impl EndpointRegistry {
    pub fn new(segments: Arc<SegmentRegistry>) -> Self {
        Self {
            segments,
            endpoints: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn segments(&self) -> &Arc<SegmentRegistry> {
        &self.segments
    }

    /// Register an endpoint in `Pending`. Registering the same key again
    /// returns the existing entry unchanged.
    pub fn register(
        &self,
        segment: &SegmentId,
        service: impl Into<ServiceName>,
        dns_mode: DnsMode,
    ) -> Result<AccessEndpoint, RegistryError> {
        if !self.segments.contains(segment) {
            return Err(RegistryError::UnknownSegment(segment.clone()));
        }

        let key = EndpointKey {
            segment: segment.clone(),
            service: service.into(),
        };
        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints.entry(key.clone()).or_insert_with(|| {
            debug!(endpoint = %key, ?dns_mode, "Registered endpoint");
            AccessEndpoint {
                key,
                dns_mode,
                binding: EndpointBinding::Pending,
            }
        });
        Ok(endpoint.clone())
    }

    /// Record the identity reported by the provisioning engine.
    pub fn bind(&self, key: &EndpointKey, id: EndpointId) -> Result<AccessEndpoint, RegistryError> {
        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints
            .get_mut(key)
            .ok_or_else(|| RegistryError::UnknownEndpoint(key.clone()))?;

        if let EndpointBinding::Bound(existing) = &endpoint.binding {
            if *existing != id {
                return Err(RegistryError::EndpointRebound {
                    key: key.clone(),
                    existing: existing.clone(),
                    attempted: id,
                });
            }
            return Ok(endpoint.clone());
        }

        debug!(endpoint = %key, %id, "Bound endpoint");
        endpoint.binding = EndpointBinding::Bound(id);
        Ok(endpoint.clone())
    }

    pub fn get(&self, key: &EndpointKey) -> Result<AccessEndpoint, RegistryError> {
        self.endpoints
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownEndpoint(key.clone()))
    }

    pub fn identity(&self, key: &EndpointKey) -> Result<EndpointId, RegistryError> {
        self.get(key)?.identity().cloned()
    }

    pub fn deregister(&self, key: &EndpointKey) -> Option<AccessEndpoint> {
        self.endpoints.write().remove(key)
    }

    pub fn endpoints(&self) -> Vec<AccessEndpoint> {
        self.endpoints.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
