//! Resolver and executor tuning.

use std::time::Duration;

use isthmus_topology_registry::RegistryConfig;
use serde::{Deserialize, Serialize};

/// Validation knobs applied while building the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    #[serde(flatten)]
    pub registry: RegistryConfig,
}

impl ResolverConfig {
    /// Treat any CIDR overlap as an error, not only overlap between peers.
    pub fn with_disjoint_cidrs(mut self, enforce: bool) -> Self {
        self.registry.enforce_disjoint_cidrs = enforce;
        self
    }

    /// Availability zones per subnet group when a segment does not say.
    pub fn with_default_max_azs(mut self, max_azs: usize) -> Self {
        self.registry.default_max_azs = max_azs;
        self
    }
}

const DEFAULT_MAX_CONCURRENCY: usize = 4;
const DEFAULT_LINK_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_MAX_LINK_POLLS: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Steps handed to the engine at the same time.
    pub max_concurrency: usize,
    /// Delay between link state polls, in milliseconds.
    pub link_poll_interval_ms: u64,
    /// Polls before a link still in `requested` counts as failed.
    pub max_link_polls: u32,
}

impl ExecutorConfig {
    pub fn link_poll_interval(&self) -> Duration {
        Duration::from_millis(self.link_poll_interval_ms)
    }

    /// A link is always polled at least once before it can time out.
    pub fn link_polls(&self) -> u32 {
        self.max_link_polls.max(1)
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_link_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.link_poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.max_link_polls = max_polls;
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            link_poll_interval_ms: DEFAULT_LINK_POLL_INTERVAL_MS,
            max_link_polls: DEFAULT_MAX_LINK_POLLS,
        }
    }
}
