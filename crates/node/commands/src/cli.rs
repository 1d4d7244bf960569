//! CLI argument assembly and top-level parser.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use isthmus_net_probe::{ProbeError, ProbeTarget};
use isthmus_node_core::version;
use isthmus_primitives::EndpointId;
use isthmus_topology::{ExecutorConfig, ResolverConfig};

pub use isthmus_node_core::args::LogArgs;

/// Isthmus - private cross-region API connectivity planner
#[derive(Debug, Parser)]
#[command(author, version = version::SHORT_VERSION, about, long_about = None)]
pub struct Cli {
    /// Logging configuration.
    #[command(flatten)]
    pub logs: LogArgs,

    /// Path to a TOML configuration file.
    #[arg(long, global = true, value_name = "PATH", env = "ISTHMUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve a topology and print its ordered plan.
    Plan(PlanArgs),
    /// Execute a topology against the in-memory engine.
    Simulate(SimulateArgs),
    /// Call an API from inside a consumer network.
    Probe(ProbeArgs),
}

/// Resolver overrides shared by `plan` and `simulate`.
#[derive(Debug, Clone, Default, Args)]
#[command(next_help_heading = "Resolver")]
pub struct ResolverArgs {
    /// Reject any CIDR overlap between segments, not only between peers.
    #[arg(long = "resolver.enforce-disjoint-cidrs")]
    pub enforce_disjoint_cidrs: bool,

    /// Availability zones per subnet group when a segment does not say.
    #[arg(long = "resolver.max-azs", value_name = "COUNT")]
    pub max_azs: Option<usize>,
}

impl ResolverArgs {
    pub fn apply(&self, config: &mut ResolverConfig) {
        if self.enforce_disjoint_cidrs {
            config.registry.enforce_disjoint_cidrs = true;
        }
        if let Some(max_azs) = self.max_azs {
            config.registry.default_max_azs = max_azs;
        }
    }
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Topology description (TOML).
    #[arg(value_name = "TOPOLOGY")]
    pub topology: PathBuf,

    /// Print the plan as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub resolver: ResolverArgs,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Topology description (TOML).
    #[arg(value_name = "TOPOLOGY")]
    pub topology: PathBuf,

    /// Output snapshot to resume from; rewritten after the run.
    #[arg(long, value_name = "PATH")]
    pub outputs: Option<PathBuf>,

    /// Polls before the simulated engine accepts a peering link.
    #[arg(long, default_value_t = 1, value_name = "POLLS")]
    pub accept_after: u32,

    /// Steps handed to the engine at the same time.
    #[arg(long = "executor.max-concurrency", value_name = "COUNT")]
    pub max_concurrency: Option<usize>,

    #[command(flatten)]
    pub resolver: ResolverArgs,
}

impl SimulateArgs {
    pub fn apply(&self, config: &mut ExecutorConfig) {
        if let Some(max_concurrency) = self.max_concurrency {
            config.max_concurrency = max_concurrency;
        }
    }
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Base URL of the exposed API. Read from `API_URL` when omitted.
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Interface endpoint id, when its private DNS is disabled.
    #[arg(long, value_name = "ID", requires = "url")]
    pub endpoint: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 10, value_name = "SECS")]
    pub timeout: u64,
}

impl ProbeArgs {
    /// Target from the flags, or from `API_URL` and `VPC_ENDPOINT_ID` when
    /// no `--url` is given.
    pub fn target(&self) -> Result<ProbeTarget, ProbeError> {
        match &self.url {
            Some(url) => ProbeTarget::new(url, self.endpoint.clone().map(EndpointId::new)),
            None => ProbeTarget::from_env(),
        }
    }
}
