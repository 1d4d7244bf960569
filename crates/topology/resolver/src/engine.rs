use std::collections::BTreeMap;

use async_trait::async_trait;
use isthmus_primitives::LinkId;
use isthmus_topology_graph::{OutputKey, ResourceIntent};
use isthmus_topology_peering::LinkState;

use crate::EngineError;

/// Values the engine reports for one applied intent.
pub type StepOutputs = BTreeMap<OutputKey, String>;

/// External provisioning engine.
///
/// `apply` is create-or-update: applying the same intent twice must converge
/// on the same resource and report the same outputs. Attribute values coming
/// from reference tokens are already filled in when `apply` is called.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    async fn apply(&self, intent: &ResourceIntent) -> Result<StepOutputs, EngineError>;

    /// Current state of a link the engine created.
    async fn poll_link(&self, link: &LinkId) -> Result<LinkState, EngineError>;
}
