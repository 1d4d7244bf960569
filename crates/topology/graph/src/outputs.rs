use std::collections::{BTreeMap, BTreeSet};

use isthmus_primitives::IntentId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{GraphError, OutputKey, OutputType, Reference, ReferenceSlot};

/// Serializable form of [`ResolvedOutputs`], used to resume a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSnapshot {
    #[serde(default)]
    pub completed: BTreeSet<IntentId>,
    #[serde(default)]
    pub values: BTreeMap<IntentId, BTreeMap<OutputKey, String>>,
}

/// Outputs reported by the provisioning engine.
///
/// Each (step, output) pair is written at most once; publishing the same
/// value again is accepted, a different value is an [`OutputConflict`].
/// A step that has to be applied again is [`retract`]ed first.
///
/// [`retract`]: ResolvedOutputs::retract
/// [`OutputConflict`]: GraphError::OutputConflict
#[derive(Debug, Default)]
pub struct ResolvedOutputs {
    inner: RwLock<OutputSnapshot>,
}

impl ResolvedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: OutputSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> OutputSnapshot {
        self.inner.read().clone()
    }

    pub fn publish(
        &self,
        producer: &IntentId,
        output: OutputKey,
        value: impl Into<String>,
    ) -> Result<(), GraphError> {
        let value = value.into();
        let mut inner = self.inner.write();
        let outputs = inner.values.entry(producer.clone()).or_default();
        match outputs.get(&output) {
            Some(existing) if *existing == value => Ok(()),
            Some(existing) => Err(GraphError::OutputConflict {
                producer: producer.clone(),
                output,
                existing: existing.clone(),
                attempted: value,
            }),
            None => {
                trace!(step = %producer, %output, %value, "Published output");
                outputs.insert(output, value);
                Ok(())
            }
        }
    }

    pub fn publish_value<T: OutputType>(
        &self,
        producer: &IntentId,
        value: &T,
    ) -> Result<(), GraphError> {
        self.publish(producer, T::KEY, value.as_output())
    }

    /// Mark a step completed. Completed steps are skipped on re-runs.
    pub fn complete(&self, step: &IntentId) {
        self.inner.write().completed.insert(step.clone());
    }

    /// Forget a step's completion and outputs so the next apply may publish
    /// different values. Returns the outputs that were dropped.
    pub fn retract(&self, step: &IntentId) -> BTreeMap<OutputKey, String> {
        let mut inner = self.inner.write();
        inner.completed.remove(step);
        let dropped = inner.values.remove(step).unwrap_or_default();
        if !dropped.is_empty() {
            trace!(%step, outputs = dropped.len(), "Retracted outputs");
        }
        dropped
    }

    pub fn is_completed(&self, step: &IntentId) -> bool {
        self.inner.read().completed.contains(step)
    }

    pub fn get(&self, producer: &IntentId, output: OutputKey) -> Option<String> {
        self.inner
            .read()
            .values
            .get(producer)
            .and_then(|outputs| outputs.get(&output))
            .cloned()
    }

    pub fn resolve<T: OutputType>(&self, reference: &Reference<T>) -> Result<T, GraphError> {
        self.lookup(reference.producer(), T::KEY)
            .map(|value| T::from_output(&value))
    }

    pub fn resolve_slot(&self, slot: &ReferenceSlot) -> Result<String, GraphError> {
        self.lookup(&slot.producer, slot.output)
    }

    fn lookup(&self, producer: &IntentId, output: OutputKey) -> Result<String, GraphError> {
        self.get(producer, output)
            .ok_or_else(|| GraphError::UnresolvedReference {
                producer: producer.clone(),
                output,
            })
    }
}
