use isthmus_primitives::{Cidr, CidrError, EndpointId, SegmentId};

use crate::EndpointKey;

/// Errors from segment declaration and endpoint tracking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown segment {0}")]
    UnknownSegment(SegmentId),
    #[error("segment {0} is already declared")]
    DuplicateSegment(SegmentId),
    #[error("segment {segment} has an invalid CIDR: {source}")]
    InvalidCidr {
        segment: SegmentId,
        #[source]
        source: CidrError,
    },
    #[error("segment {segment} ({cidr}) overlaps segment {other} ({other_cidr})")]
    OverlappingCidr {
        segment: SegmentId,
        cidr: Cidr,
        other: SegmentId,
        other_cidr: Cidr,
    },
    #[error("unknown endpoint {0}")]
    UnknownEndpoint(EndpointKey),
    #[error("endpoint {0} is not bound yet")]
    EndpointNotBound(EndpointKey),
    #[error("endpoint {key} is bound to {existing}, refusing to rebind to {attempted}")]
    EndpointRebound {
        key: EndpointKey,
        existing: EndpointId,
        attempted: EndpointId,
    },
}
