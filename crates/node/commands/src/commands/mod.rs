//! Subcommand implementations.

pub mod plan;
pub mod probe;
pub mod simulate;

use std::path::Path;

use eyre::{Result, WrapErr};
use isthmus_topology::{ResolvedTopology, Resolver, ResolverConfig, TopologyDescription};

/// Read and resolve a topology description.
pub(crate) fn resolve(path: &Path, config: ResolverConfig) -> Result<ResolvedTopology> {
    let description = TopologyDescription::from_file(path)
        .wrap_err_with(|| format!("Failed to load topology from {}", path.display()))?;
    Resolver::new(config)
        .resolve(&description)
        .wrap_err_with(|| format!("Topology {} is not valid", description.name))
}
