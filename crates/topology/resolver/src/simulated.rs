//! In-memory provisioning engine with deterministic identities.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use isthmus_primitives::{IntentId, LinkId};
use isthmus_topology_graph::{OutputKey, ResourceIntent, StepKind};
use isthmus_topology_peering::LinkState;
use parking_lot::Mutex;
use tracing::debug;

use crate::{EngineError, ProvisioningEngine, StepOutputs};

#[derive(Debug, Default)]
struct SimulatedState {
    counter: u64,
    applied: Vec<IntentId>,
    outputs: BTreeMap<IntentId, StepOutputs>,
    /// Polls seen per link.
    links: BTreeMap<LinkId, u32>,
}

/// Engine that invents identities instead of calling a cloud API.
///
/// Links are accepted after `accept_after` polls. Steps listed in `fail_on`
/// always fail; links listed in `reject` end up `Failed`.
#[derive(Debug, Default)]
pub struct SimulatedEngine {
    accept_after: u32,
    latency: Option<Duration>,
    fail_on: BTreeSet<IntentId>,
    reject: BTreeSet<IntentId>,
    state: Mutex<SimulatedState>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept_links_after(mut self, polls: u32) -> Self {
        self.accept_after = polls;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fail_on(mut self, step: impl Into<IntentId>) -> Self {
        self.fail_on.insert(step.into());
        self
    }

    /// Reject the link created by the given peering step.
    pub fn reject_link(mut self, step: impl Into<IntentId>) -> Self {
        self.reject.insert(step.into());
        self
    }

    /// Steps in the order they were first applied.
    pub fn applied(&self) -> Vec<IntentId> {
        self.state.lock().applied.clone()
    }

    pub fn apply_count(&self) -> usize {
        self.state.lock().applied.len()
    }

    fn outputs_for(intent: &ResourceIntent, n: u64) -> StepOutputs {
        let region = intent.placement.region.as_str();
        let account = intent.placement.account.as_str();
        let mut outputs = StepOutputs::new();
        match intent.kind {
            StepKind::Segment => {
                outputs.insert(OutputKey::ResourceId, format!("vpc-{n:08x}"));
            }
            StepKind::Endpoint => {
                outputs.insert(OutputKey::EndpointId, format!("vpce-{n:08x}"));
            }
            StepKind::TrustRole => {
                outputs.insert(
                    OutputKey::RoleArn,
                    format!("arn:aws:iam::{account}:role/peering-accepter-{n:04}"),
                );
            }
            StepKind::PeeringLink => {
                outputs.insert(OutputKey::LinkId, format!("pcx-{n:08x}"));
            }
            StepKind::Route => {
                outputs.insert(OutputKey::ResourceId, format!("r-{n:08x}"));
            }
            StepKind::IngressRule => {
                outputs.insert(OutputKey::ResourceId, format!("sgr-{n:08x}"));
            }
            StepKind::Policy => {}
            StepKind::ExposedApi => {
                let api = format!("{n:010x}");
                outputs.insert(
                    OutputKey::ApiUrl,
                    format!("https://{api}.execute-api.{region}.amazonaws.com/prod/"),
                );
                outputs.insert(
                    OutputKey::ExecuteArn,
                    format!("arn:aws:execute-api:{region}:{account}:{api}/*"),
                );
                outputs.insert(OutputKey::ResourceId, api);
            }
            StepKind::ProbeConfig => {
                outputs.insert(OutputKey::ResourceId, format!("probe-{n:08x}"));
            }
        }
        outputs
    }
}

#[async_trait]
impl ProvisioningEngine for SimulatedEngine {
    async fn apply(&self, intent: &ResourceIntent) -> Result<StepOutputs, EngineError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_on.contains(&intent.id) {
            return Err(EngineError::new(format!("simulated failure applying {}", intent.id)));
        }

        let mut state = self.state.lock();
        if let Some(existing) = state.outputs.get(&intent.id) {
            return Ok(existing.clone());
        }

        state.counter += 1;
        let outputs = Self::outputs_for(intent, state.counter);
        if let Some(link) = outputs.get(&OutputKey::LinkId) {
            state.links.insert(LinkId::new(link.clone()), 0);
        }
        debug!(step = %intent.id, ?outputs, "Simulated apply");
        state.applied.push(intent.id.clone());
        state.outputs.insert(intent.id.clone(), outputs.clone());
        Ok(outputs)
    }

    async fn poll_link(&self, link: &LinkId) -> Result<LinkState, EngineError> {
        let mut state = self.state.lock();
        let rejected = state
            .outputs
            .iter()
            .filter(|(step, _)| self.reject.contains(*step))
            .any(|(_, outputs)| outputs.get(&OutputKey::LinkId).map(String::as_str) == Some(link.as_str()));

        let Some(polls) = state.links.get_mut(link) else {
            return Err(EngineError::new(format!("unknown link {link}")));
        };
        *polls += 1;

        if rejected {
            Ok(LinkState::Failed)
        } else if *polls > self.accept_after {
            Ok(LinkState::Active)
        } else {
            Ok(LinkState::Requested)
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use isthmus_primitives::Placement;

    use super::*;

    fn intent(id: &str, kind: StepKind) -> ResourceIntent {
        ResourceIntent::new(id, kind, Placement::new("111111111111", "us-east-2"))
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let engine = SimulatedEngine::new();
        let endpoint = intent("endpoint:provider:execute-api", StepKind::Endpoint);

        let first = engine.apply(&endpoint).await.unwrap();
        let second = engine.apply(&endpoint).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.apply_count(), 1);
        assert!(first[&OutputKey::EndpointId].starts_with("vpce-"));
    }

    #[tokio::test]
    async fn test_api_url_uses_region() {
        let engine = SimulatedEngine::new();
        let outputs = engine.apply(&intent("api:hello", StepKind::ExposedApi)).await.unwrap();
        let url = &outputs[&OutputKey::ApiUrl];
        assert!(url.starts_with("https://"));
        assert!(url.ends_with(".execute-api.us-east-2.amazonaws.com/prod/"));

        let api = &outputs[&OutputKey::ResourceId];
        assert_eq!(
            outputs[&OutputKey::ExecuteArn],
            format!("arn:aws:execute-api:us-east-2:111111111111:{api}/*")
        );
    }

    #[tokio::test]
    async fn test_links_accept_after_polls() {
        let engine = SimulatedEngine::new().accept_links_after(2);
        let outputs = engine.apply(&intent("peering:a->b", StepKind::PeeringLink)).await.unwrap();
        let link = LinkId::new(outputs[&OutputKey::LinkId].clone());

        assert_eq!(engine.poll_link(&link).await.unwrap(), LinkState::Requested);
        assert_eq!(engine.poll_link(&link).await.unwrap(), LinkState::Requested);
        assert_eq!(engine.poll_link(&link).await.unwrap(), LinkState::Active);
    }

    #[tokio::test]
    async fn test_rejected_link_and_failures() {
        let engine = SimulatedEngine::new()
            .reject_link("peering:a->b")
            .fail_on("route:x");

        let outputs = engine.apply(&intent("peering:a->b", StepKind::PeeringLink)).await.unwrap();
        let link = LinkId::new(outputs[&OutputKey::LinkId].clone());
        assert_eq!(engine.poll_link(&link).await.unwrap(), LinkState::Failed);

        assert!(engine.apply(&intent("route:x", StepKind::Route)).await.is_err());
        assert_matches!(engine.poll_link(&"pcx-ghost".into()).await, Err(_));
    }
}
