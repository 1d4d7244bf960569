use isthmus_primitives::{IntentId, LinkId};
use isthmus_topology_graph::{GraphError, OutputKey};
use isthmus_topology_peering::PeeringError;
use isthmus_topology_policy::PolicyError;
use isthmus_topology_registry::RegistryError;

/// Structural errors found while resolving a description into a plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid topology description: {0}")]
    Description(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Peering(#[from] PeeringError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Failure reported by a provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Why a single step did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Peering(#[from] PeeringError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("engine did not report {output} for step {step}")]
    MissingOutput { step: IntentId, output: OutputKey },
    #[error("step {step} is missing attribute {attribute}")]
    MissingAttribute { step: IntentId, attribute: String },
    #[error("{output} of step {step} no longer matches the previous run")]
    OutputChanged { step: IntentId, output: OutputKey },
    #[error("peering link {0} was rejected")]
    LinkFailed(LinkId),
    #[error("peering link {link} still requested after {polls} polls")]
    LinkTimeout { link: LinkId, polls: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecuteError {
    #[error("provisioning {intent_id} failed: {cause}")]
    ProvisioningFailed {
        intent_id: IntentId,
        #[source]
        cause: StepError,
    },
    #[error("execution cancelled with {remaining} steps outstanding")]
    Cancelled { remaining: usize },
}
