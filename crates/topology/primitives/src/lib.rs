//! Primitive types shared across the topology resolver.
//!
//! - [`Cidr`] - validated, canonical network range with overlap checks
//! - [`Placement`] - the (account, region) boundary a resource lives in
//! - string identifiers ([`SegmentId`], [`EndpointId`], [`LinkId`], ...)
//! - [`SubnetKind`] and [`DnsMode`]

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod cidr;
mod ids;
mod kinds;
mod placement;

pub use cidr::{Cidr, CidrError};
pub use ids::{
    AccountId, ApiId, ApiUrl, EndpointId, ExecuteArn, IntentId, LinkId, PolicyDocument, Region,
    ResourceId, RoleArn, RouteTableId, SegmentId, ServiceName, SubnetId, TrustRoleId,
};
pub use kinds::{DnsMode, SubnetKind};
pub use placement::Placement;
