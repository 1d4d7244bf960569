//! Peering between segments.
//!
//! The [`PeeringResolver`] turns a `(requester, accepter)` pair into a
//! [`PeeringLink`] plus the requester-side [`Route`]s it needs. Links that
//! cross an account or region boundary require the accepter to have
//! published a [`TrustRole`] for the requester's account first.
//!
//! Routing is asymmetric: only the requester's isolated/private subnets are
//! routed towards the accepter. Return routes are a separate, explicit call
//! ([`PeeringResolver::return_routes`]) because the accepter side decides for
//! itself whether to route traffic back.

mod error;
mod link;
mod resolver;
mod route;
mod trust;

pub use error::PeeringError;
pub use link::{LinkState, PeeringLink};
pub use resolver::{LinkResolution, PeeringResolver};
pub use route::Route;
pub use trust::{PEERING_ACCEPT_ACTIONS, TrustRole, TrustRoleStore};
