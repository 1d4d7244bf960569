use std::collections::{BTreeMap, BTreeSet};

use isthmus_primitives::{IntentId, Placement};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

use crate::{GraphError, OutputType, Reference, ResolvedOutputs};

/// Kind of construction step. Declaration order is the tie-break rank used
/// when several steps are ready at once.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StepKind {
    Segment,
    Endpoint,
    TrustRole,
    PeeringLink,
    Route,
    IngressRule,
    Policy,
    ExposedApi,
    ProbeConfig,
}

impl StepKind {
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// A value the provisioning engine reports back for a step.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OutputKey {
    ResourceId,
    EndpointId,
    LinkId,
    RoleArn,
    ApiUrl,
    ExecuteArn,
    PolicyDocument,
}

/// An attribute whose value is filled from another step's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSlot {
    pub attribute: String,
    pub producer: IntentId,
    pub output: OutputKey,
}

/// Request for the engine to create-or-update one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceIntent {
    pub id: IntentId,
    pub kind: StepKind,
    pub placement: Placement,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    /// Same-placement ordering edges.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<IntentId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceSlot>,
}

impl ResourceIntent {
    pub fn new(id: impl Into<IntentId>, kind: StepKind, placement: Placement) -> Self {
        Self {
            id: id.into(),
            kind,
            placement,
            attributes: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            references: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_dependency(mut self, producer: impl Into<IntentId>) -> Self {
        self.depends_on.insert(producer.into());
        self
    }

    /// Fill `attribute` from `reference` once its producer has published.
    pub fn with_reference<T: OutputType>(
        mut self,
        attribute: impl Into<String>,
        reference: &Reference<T>,
    ) -> Self {
        self.references.push(reference.slot(attribute));
        self
    }

    /// Every step that must complete first: plain edges plus reference producers.
    pub fn prerequisites(&self) -> BTreeSet<&IntentId> {
        self.depends_on
            .iter()
            .chain(self.references.iter().map(|slot| &slot.producer))
            .collect()
    }

    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Copy of this intent with every reference slot written into `attributes`.
    pub fn bind_references(&self, outputs: &ResolvedOutputs) -> Result<Self, GraphError> {
        let mut bound = self.clone();
        for slot in &self.references {
            let value = outputs.resolve_slot(slot)?;
            bound
                .attributes
                .insert(slot.attribute.clone(), Value::String(value));
        }
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use isthmus_primitives::EndpointId;

    use super::*;

    fn placement() -> Placement {
        Placement::new("111111111111", "us-east-2")
    }

    #[test]
    fn test_rank_follows_construction_order() {
        assert!(StepKind::Segment.rank() < StepKind::Endpoint.rank());
        assert!(StepKind::PeeringLink.rank() < StepKind::Route.rank());
        assert!(StepKind::Policy.rank() < StepKind::ExposedApi.rank());
        assert!(StepKind::ExposedApi.rank() < StepKind::ProbeConfig.rank());
    }

    #[test]
    fn test_prerequisites_merge_edges_and_references() {
        let reference = Reference::<EndpointId>::new("endpoint:consumer");
        let intent = ResourceIntent::new("policy:api", StepKind::Policy, placement())
            .with_dependency("endpoint:provider")
            .with_reference("external", &reference)
            .with_dependency("endpoint:consumer");

        let prerequisites: Vec<_> = intent.prerequisites().into_iter().cloned().collect();
        assert_eq!(
            prerequisites,
            vec![IntentId::from("endpoint:consumer"), IntentId::from("endpoint:provider")]
        );
    }

    #[test]
    fn test_bind_references() {
        let reference = Reference::<EndpointId>::new("endpoint:consumer");
        let intent = ResourceIntent::new("policy:api", StepKind::Policy, placement())
            .with_attribute("api", "api")
            .with_reference("external", &reference);

        let outputs = ResolvedOutputs::new();
        assert_matches!(
            intent.bind_references(&outputs),
            Err(GraphError::UnresolvedReference { output: OutputKey::EndpointId, .. })
        );

        outputs
            .publish_value(&"endpoint:consumer".into(), &EndpointId::from("vpce-c"))
            .unwrap();
        let bound = intent.bind_references(&outputs).unwrap();
        assert_eq!(bound.attribute_str("external"), Some("vpce-c"));
        assert_eq!(bound.attribute_str("api"), Some("api"));
    }

    #[test]
    fn test_intent_serde_skips_empty_collections() {
        let intent = ResourceIntent::new("segment:provider", StepKind::Segment, placement());
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["kind"], "segment");
        assert!(json.get("depends_on").is_none());

        let back: ResourceIntent = serde_json::from_value(json).unwrap();
        assert_eq!(back, intent);
    }
}
