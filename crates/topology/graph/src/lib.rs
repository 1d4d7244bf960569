//! Dependency graph over resource intents.
//!
//! Every construction step is a [`ResourceIntent`]. Steps depend on each other
//! either through plain edges (same placement only) or through typed
//! [`Reference`] tokens, which are the only way a value may cross an
//! account/region boundary. [`DependencyGraph::into_plan`] validates the graph
//! and produces a deterministic [`Plan`]; [`ResolvedOutputs`] collects what the
//! provisioning engine reports so tokens can be resolved at execution time.

mod error;
mod graph;
mod intent;
mod outputs;
mod reference;

pub use error::GraphError;
pub use graph::{DependencyGraph, Plan};
pub use intent::{OutputKey, ReferenceSlot, ResourceIntent, StepKind};
pub use outputs::{OutputSnapshot, ResolvedOutputs};
pub use reference::{OutputType, Reference};
