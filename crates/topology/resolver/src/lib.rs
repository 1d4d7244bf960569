//! Topology resolution and plan execution.
//!
//! A [`TopologyDescription`] names segments, endpoints, trust roles, peering
//! links, at most one exposed API and any probe functions. [`Resolver`] checks
//! it structurally and turns it into a [`ResolvedTopology`] holding an ordered
//! plan. [`Executor`] then walks that plan against a [`ProvisioningEngine`],
//! filling reference tokens from outputs as steps complete.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use isthmus_topology::{Executor, ExecutorConfig, Resolver, SimulatedEngine, TopologyDescription};
//! use isthmus_topology_graph::ResolvedOutputs;
//!
//! let description = TopologyDescription::from_file(Path::new("topology.toml"))?;
//! let topology = Resolver::default().resolve(&description)?;
//! let outputs = ResolvedOutputs::new();
//! let report = Executor::new(Arc::new(SimulatedEngine::new()), ExecutorConfig::default())
//!     .execute(&topology, &outputs)
//!     .await
//!     .into_result()?;
//! # let _ = report;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod config;
mod description;
mod engine;
mod error;
mod events;
mod executor;
mod resolver;
mod simulated;
pub mod steps;

pub use config::{ExecutorConfig, ResolverConfig};
pub use description::{
    API_SERVICE, ApiDecl, EndpointDecl, HTTPS_PORT, INVOKE_ACTION, PeeringDecl, ProbeDecl,
    TopologyDescription, TrustRoleDecl,
};
pub use engine::{ProvisioningEngine, StepOutputs};
pub use error::{EngineError, ExecuteError, ResolveError, StepError};
pub use events::{EventEmitter, ExecutionEvent};
pub use executor::{ExecutionReport, Executor};
pub use resolver::{ApiBinding, IngressRule, ResolvedTopology, Resolver};
pub use simulated::SimulatedEngine;
