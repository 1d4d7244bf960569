//! Runs a resolved plan against a [`ProvisioningEngine`].
//!
//! Ready steps run concurrently up to `max_concurrency`; a step is ready once
//! every prerequisite completed. A failed step skips everything downstream of
//! it and leaves independent branches running. Nothing is rolled back:
//! re-running with the same [`ResolvedOutputs`] skips completed steps whose
//! inputs are unchanged. A completed step is applied again when one of its
//! prerequisites is, or when its own output would now differ.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use isthmus_primitives::{ApiId, EndpointId, IntentId, LinkId, PolicyDocument};
use isthmus_topology_graph::{OutputKey, OutputSnapshot, ResolvedOutputs, ResourceIntent, StepKind};
use isthmus_topology_peering::{LinkState, PeeringLink};
use isthmus_topology_policy::ApiAccess;
use isthmus_topology_registry::EndpointKey;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    EventEmitter, ExecuteError, ExecutorConfig, ProvisioningEngine, ResolvedTopology, StepError,
    StepOutputs,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Outcome of one execution run.
#[derive(Debug)]
pub struct ExecutionReport {
    /// Applied during this run, in completion order.
    pub completed: Vec<IntentId>,
    /// Completed by an earlier run.
    pub reused: Vec<IntentId>,
    /// Completed by an earlier run but applied again, since an input changed.
    pub reapplied: Vec<IntentId>,
    pub failed: BTreeMap<IntentId, StepError>,
    /// Skipped step and the failed step upstream of it.
    pub skipped: BTreeMap<IntentId, IntentId>,
    /// Never started because execution was cancelled.
    pub cancelled: Vec<IntentId>,
    pub links: Vec<PeeringLink>,
    pub api: Option<Arc<ApiAccess>>,
    pub outputs: OutputSnapshot,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && self.cancelled.is_empty()
    }

    /// First failure as an error, or the report when everything completed.
    pub fn into_result(self) -> Result<Self, ExecuteError> {
        if let Some((intent_id, cause)) = self.failed.iter().next() {
            return Err(ExecuteError::ProvisioningFailed {
                intent_id: intent_id.clone(),
                cause: cause.clone(),
            });
        }
        if !self.cancelled.is_empty() {
            return Err(ExecuteError::Cancelled {
                remaining: self.cancelled.len(),
            });
        }
        Ok(self)
    }
}

pub struct Executor<E> {
    engine: Arc<E>,
    config: ExecutorConfig,
    events: EventEmitter,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<E: ProvisioningEngine> Executor<E> {
    pub fn new(engine: Arc<E>, config: ExecutorConfig) -> Self {
        Self {
            engine,
            config,
            events: EventEmitter::default(),
            shutdown: None,
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// Stop dispatching new steps once the channel carries `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub async fn execute(
        &self,
        topology: &ResolvedTopology,
        outputs: &ResolvedOutputs,
    ) -> ExecutionReport {
        let ctx = StepContext {
            engine: self.engine.as_ref(),
            config: &self.config,
            events: &self.events,
            outputs,
            topology,
            links: Mutex::new(
                topology
                    .links
                    .iter()
                    .map(|link| (link.id.clone(), link.clone()))
                    .collect(),
            ),
            api: Mutex::new(None),
        };
        let plan = &topology.plan;
        let max_concurrency = self.config.max_concurrency.max(1);

        let mut status: BTreeMap<&IntentId, StepStatus> = plan
            .intents()
            .iter()
            .map(|intent| (&intent.id, StepStatus::Pending))
            .collect();
        let mut report = ExecutionReport {
            completed: Vec::new(),
            reused: Vec::new(),
            reapplied: Vec::new(),
            failed: BTreeMap::new(),
            skipped: BTreeMap::new(),
            cancelled: Vec::new(),
            links: Vec::new(),
            api: None,
            outputs: OutputSnapshot::default(),
        };

        // Plan order guarantees prerequisites are decided before their dependents.
        for intent in plan.intents() {
            if !outputs.is_completed(&intent.id) {
                continue;
            }
            let upstream_reused = intent
                .prerequisites()
                .into_iter()
                .all(|producer| status.get(producer) == Some(&StepStatus::Completed));
            if !upstream_reused {
                debug!(step = %intent.id, "Prerequisite is applied again, reapplying step");
                outputs.retract(&intent.id);
                report.reapplied.push(intent.id.clone());
                continue;
            }
            match ctx.restore(intent) {
                Ok(()) => {
                    status.insert(&intent.id, StepStatus::Completed);
                    report.reused.push(intent.id.clone());
                    self.events.step_reused(intent.id.clone());
                }
                Err(err) => {
                    info!(step = %intent.id, %err, "Could not reuse completed step, applying again");
                    outputs.retract(&intent.id);
                    report.reapplied.push(intent.id.clone());
                }
            }
        }

        info!(
            topology = %topology.name,
            steps = plan.len(),
            reused = report.reused.len(),
            max_concurrency,
            "Executing plan"
        );

        let mut in_flight = FuturesUnordered::new();
        let mut cancelled = false;
        loop {
            if !cancelled && self.is_shutdown() {
                cancelled = true;
                let outstanding = status
                    .values()
                    .filter(|s| **s == StepStatus::Pending)
                    .count();
                info!(outstanding, in_flight = in_flight.len(), "Cancellation requested");
                self.events.cancelled(outstanding);
            }

            if !cancelled {
                for intent in plan.intents() {
                    if in_flight.len() >= max_concurrency {
                        break;
                    }
                    if status.get(&intent.id) != Some(&StepStatus::Pending) {
                        continue;
                    }
                    let ready = intent
                        .prerequisites()
                        .into_iter()
                        .all(|producer| status.get(producer) == Some(&StepStatus::Completed));
                    if ready {
                        status.insert(&intent.id, StepStatus::Running);
                        self.events.step_started(intent.id.clone(), intent.kind);
                        in_flight.push(ctx.run(intent));
                    }
                }
            }

            let Some((id, result)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(()) => {
                    debug!(step = %id, "Step completed");
                    status.insert(id, StepStatus::Completed);
                    report.completed.push(id.clone());
                    self.events.step_completed(id.clone());
                }
                Err(err) => {
                    warn!(step = %id, %err, "Step failed, skipping its dependents");
                    status.insert(id, StepStatus::Failed);
                    self.events.step_failed(id.clone(), err.to_string());
                    report.failed.insert(id.clone(), err);

                    for dependent in plan.dependents_of(id) {
                        let Some((key, entry)) = status.get_key_value(&dependent) else {
                            continue;
                        };
                        if *entry == StepStatus::Pending {
                            let key = *key;
                            status.insert(key, StepStatus::Skipped);
                            self.events.step_skipped(dependent.clone(), id.clone());
                            report.skipped.insert(dependent, id.clone());
                        }
                    }
                }
            }
        }
        drop(in_flight);

        report.cancelled = status
            .iter()
            .filter(|(_, s)| **s == StepStatus::Pending)
            .map(|(id, _)| (*id).clone())
            .collect();
        report.links = ctx.links.lock().values().cloned().collect();
        report.api = ctx.api.lock().clone();
        report.outputs = outputs.snapshot();

        info!(
            completed = report.completed.len(),
            reused = report.reused.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            cancelled = report.cancelled.len(),
            "Execution finished"
        );
        report
    }
}

/// Outputs each kind must report; without them dependents could never resolve.
fn required_outputs(kind: StepKind) -> &'static [OutputKey] {
    match kind {
        StepKind::Segment | StepKind::IngressRule => &[OutputKey::ResourceId],
        StepKind::Endpoint => &[OutputKey::EndpointId],
        StepKind::TrustRole => &[OutputKey::RoleArn],
        StepKind::PeeringLink => &[OutputKey::LinkId],
        StepKind::ExposedApi => &[OutputKey::ApiUrl, OutputKey::ExecuteArn],
        StepKind::Route | StepKind::Policy | StepKind::ProbeConfig => &[],
    }
}

fn attribute<'a>(intent: &'a ResourceIntent, name: &str) -> Result<&'a str, StepError> {
    intent
        .attribute_str(name)
        .ok_or_else(|| StepError::MissingAttribute {
            step: intent.id.clone(),
            attribute: name.to_owned(),
        })
}

struct StepContext<'a, E> {
    engine: &'a E,
    config: &'a ExecutorConfig,
    events: &'a EventEmitter,
    outputs: &'a ResolvedOutputs,
    topology: &'a ResolvedTopology,
    /// Keyed by the resolver's link id, not the engine's.
    links: Mutex<BTreeMap<LinkId, PeeringLink>>,
    api: Mutex<Option<Arc<ApiAccess>>>,
}

impl<E: ProvisioningEngine> StepContext<'_, E> {
    async fn run<'b>(&'b self, intent: &'b ResourceIntent) -> (&'b IntentId, Result<(), StepError>) {
        let result = self.execute_step(intent).await;
        (&intent.id, result)
    }

    async fn execute_step(&self, intent: &ResourceIntent) -> Result<(), StepError> {
        let bound = intent.bind_references(self.outputs)?;

        if intent.kind == StepKind::Policy {
            let (access, document) = self.synthesize_policy(&bound)?;
            self.outputs.publish_value(&intent.id, &document)?;
            *self.api.lock() = Some(Arc::new(access));
        } else {
            let reported = self.engine.apply(&bound).await?;
            self.record(intent, reported)?;
            match intent.kind {
                StepKind::Endpoint => self.bind_endpoint(intent)?,
                StepKind::PeeringLink => self.await_link(intent).await?,
                _ => {}
            }
        }

        self.outputs.complete(&intent.id);
        Ok(())
    }

    /// Re-derive local state for a step completed by an earlier run.
    fn restore(&self, intent: &ResourceIntent) -> Result<(), StepError> {
        match intent.kind {
            StepKind::Endpoint => self.bind_endpoint(intent)?,
            StepKind::PeeringLink => {
                let local = LinkId::from(attribute(intent, "link")?);
                if let Some(link) = self.links.lock().get_mut(&local) {
                    link.transition(LinkState::Active)?;
                }
            }
            StepKind::Policy => {
                let bound = intent.bind_references(self.outputs)?;
                let (access, document) = self.synthesize_policy(&bound)?;
                let previous = self.outputs.get(&intent.id, OutputKey::PolicyDocument);
                if previous.as_deref() != Some(document.as_str()) {
                    return Err(StepError::OutputChanged {
                        step: intent.id.clone(),
                        output: OutputKey::PolicyDocument,
                    });
                }
                *self.api.lock() = Some(Arc::new(access));
            }
            _ => {}
        }
        Ok(())
    }

    fn record(&self, intent: &ResourceIntent, reported: StepOutputs) -> Result<(), StepError> {
        let missing = required_outputs(intent.kind)
            .iter()
            .find(|required| !reported.contains_key(required));
        if let Some(required) = missing {
            return Err(StepError::MissingOutput {
                step: intent.id.clone(),
                output: *required,
            });
        }
        for (key, value) in reported {
            self.outputs.publish(&intent.id, key, value)?;
        }
        Ok(())
    }

    fn bind_endpoint(&self, intent: &ResourceIntent) -> Result<(), StepError> {
        let key = EndpointKey::new(attribute(intent, "segment")?, attribute(intent, "service")?);
        let id = self
            .outputs
            .get(&intent.id, OutputKey::EndpointId)
            .ok_or_else(|| StepError::MissingOutput {
                step: intent.id.clone(),
                output: OutputKey::EndpointId,
            })?;
        self.topology.endpoints.bind(&key, EndpointId::new(id))?;
        Ok(())
    }

    /// Poll until the link leaves `Requested`. Only `Active` completes the step.
    async fn await_link(&self, intent: &ResourceIntent) -> Result<(), StepError> {
        let local = LinkId::from(attribute(intent, "link")?);
        let remote = self
            .outputs
            .get(&intent.id, OutputKey::LinkId)
            .map(LinkId::new)
            .ok_or_else(|| StepError::MissingOutput {
                step: intent.id.clone(),
                output: OutputKey::LinkId,
            })?;

        let polls = self.config.link_polls();
        for _ in 0..polls {
            let state = self.engine.poll_link(&remote).await?;
            self.observe_link(&local, state)?;
            match state {
                LinkState::Active => return Ok(()),
                LinkState::Failed => return Err(StepError::LinkFailed(local)),
                LinkState::Requested => tokio::time::sleep(self.config.link_poll_interval()).await,
            }
        }

        Err(StepError::LinkTimeout { link: local, polls })
    }

    fn observe_link(&self, local: &LinkId, state: LinkState) -> Result<(), StepError> {
        let mut links = self.links.lock();
        let Some(link) = links.get_mut(local) else {
            return Ok(());
        };
        let old_state = link.state;
        link.transition(state)?;
        if old_state != state {
            self.events.link_state_changed(local.clone(), old_state, state);
        }
        Ok(())
    }

    /// Policy steps are synthesized locally from the bound identities.
    fn synthesize_policy(
        &self,
        bound: &ResourceIntent,
    ) -> Result<(ApiAccess, PolicyDocument), StepError> {
        let own_key = EndpointKey::new(
            attribute(bound, "own_segment")?,
            attribute(bound, "own_service")?,
        );
        let own = self.topology.endpoints.get(&own_key)?;
        let external: Vec<EndpointId> = bound
            .attributes
            .iter()
            .filter(|(name, _)| name.starts_with("external:"))
            .filter_map(|(_, value)| value.as_str())
            .map(EndpointId::from)
            .collect();

        let access = ApiAccess::new(ApiId::from(attribute(bound, "api")?), &own, &external)?;
        let document = access.current().policy.document();
        Ok((access, document))
    }
}
