use isthmus_primitives::{IntentId, Placement};

use crate::OutputKey;

/// Structural errors, all raised before any engine call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("step {0} is declared twice")]
    DuplicateStep(IntentId),
    #[error("step {step} depends on unknown step {missing}")]
    UnknownDependency { step: IntentId, missing: IntentId },
    #[error(
        "step {consumer} ({consumer_placement}) depends directly on {producer} \
         ({producer_placement}); cross-boundary values need a reference"
    )]
    ImplicitCrossBoundary {
        consumer: IntentId,
        consumer_placement: Placement,
        producer: IntentId,
        producer_placement: Placement,
    },
    #[error("dependency cycle between steps {steps:?}")]
    CyclicDependency { steps: Vec<IntentId> },
    #[error("{output} of step {producer} has not been published")]
    UnresolvedReference { producer: IntentId, output: OutputKey },
    #[error("{output} of step {producer} is already {existing}, refusing {attempted}")]
    OutputConflict {
        producer: IntentId,
        output: OutputKey,
        existing: String,
        attempted: String,
    },
}
