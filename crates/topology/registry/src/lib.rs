//! Declared network segments and the interface endpoints they expose.
//!
//! Segments are declared once into a [`SegmentRegistry`] and are immutable
//! afterwards; the registry is then frozen into an `Arc` and shared with the
//! [`EndpointRegistry`], whose entries move from `Pending` to `Bound` as the
//! provisioning engine reports concrete endpoint identities.

mod endpoint;
mod error;
mod segment;

pub use endpoint::{AccessEndpoint, EndpointBinding, EndpointKey, EndpointRegistry};
pub use error::RegistryError;
pub use segment::{
    DEFAULT_MAX_AZS, RegistryConfig, Segment, SegmentDecl, SegmentRegistry, Subnet, SubnetGroup,
};
