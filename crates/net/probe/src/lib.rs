//! Reachability probe for an API exposed only through interface endpoints.
//!
//! Runs from inside a consumer segment: resolve the API host, issue one GET
//! and report what came back. When the endpoint in front of the API has
//! private DNS disabled the public API hostname does not resolve to it, so
//! [`ProbeTarget::rewrite_url`] addresses the endpoint explicitly.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod error;
mod probe;
mod target;

pub use error::ProbeError;
pub use probe::{ProbeResponse, Prober};
pub use target::{API_URL_VAR, ENDPOINT_ID_VAR, ProbeTarget};
