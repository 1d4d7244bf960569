use std::collections::{BTreeMap, BTreeSet};

use isthmus_primitives::IntentId;
use serde::Serialize;
use tracing::{debug, info};

use crate::{GraphError, ResourceIntent, StepKind};

/// Steps keyed by id, not yet validated.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    intents: BTreeMap<IntentId, ResourceIntent>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, intent: ResourceIntent) -> Result<(), GraphError> {
        if self.intents.contains_key(&intent.id) {
            return Err(GraphError::DuplicateStep(intent.id));
        }
        self.intents.insert(intent.id.clone(), intent);
        Ok(())
    }

    pub fn get(&self, id: &IntentId) -> Option<&ResourceIntent> {
        self.intents.get(id)
    }

    pub fn contains(&self, id: &IntentId) -> bool {
        self.intents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Check for dangling edges and plain edges that cross a placement.
    pub fn validate(&self) -> Result<(), GraphError> {
        for intent in self.intents.values() {
            for producer in &intent.depends_on {
                let Some(upstream) = self.intents.get(producer) else {
                    return Err(GraphError::UnknownDependency {
                        step: intent.id.clone(),
                        missing: producer.clone(),
                    });
                };
                if upstream.placement != intent.placement {
                    return Err(GraphError::ImplicitCrossBoundary {
                        consumer: intent.id.clone(),
                        consumer_placement: intent.placement.clone(),
                        producer: producer.clone(),
                        producer_placement: upstream.placement.clone(),
                    });
                }
            }
            for slot in &intent.references {
                if !self.intents.contains_key(&slot.producer) {
                    return Err(GraphError::UnknownDependency {
                        step: intent.id.clone(),
                        missing: slot.producer.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Topological order with deterministic tie-breaking by (kind rank, id).
    pub fn order(&self) -> Result<Vec<IntentId>, GraphError> {
        self.validate()?;

        let mut pending: BTreeMap<&IntentId, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&IntentId, Vec<&IntentId>> = BTreeMap::new();
        for intent in self.intents.values() {
            let prerequisites = intent.prerequisites();
            pending.insert(&intent.id, prerequisites.len());
            for producer in prerequisites {
                dependents.entry(producer).or_default().push(&intent.id);
            }
        }

        let mut ready: BTreeSet<(u8, &IntentId)> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| (self.rank_of(id), *id))
            .collect();

        let mut order = Vec::with_capacity(self.intents.len());
        while let Some((_, id)) = ready.pop_first() {
            order.push(id.clone());
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert((self.rank_of(dependent), *dependent));
                    }
                }
            }
        }

        if order.len() < self.intents.len() {
            let placed: BTreeSet<&IntentId> = order.iter().collect();
            let steps = self.cycle_members(&placed);
            return Err(GraphError::CyclicDependency { steps });
        }

        debug!(steps = order.len(), "Ordered dependency graph");
        Ok(order)
    }

    /// Group the ordered steps into levels; every step in a level only depends
    /// on steps in earlier levels, so a level may run concurrently.
    pub fn stages(&self) -> Result<Vec<Vec<IntentId>>, GraphError> {
        let order = self.order()?;
        Ok(self.stages_of(&order))
    }

    pub fn into_plan(self) -> Result<Plan, GraphError> {
        let order = self.order()?;
        let stages = self.stages_of(&order);

        let mut intents = self.intents;
        let ordered: Vec<ResourceIntent> = order
            .iter()
            .filter_map(|id| intents.remove(id))
            .collect();

        info!(steps = ordered.len(), stages = stages.len(), "Computed plan");
        Ok(Plan {
            intents: ordered,
            stages,
        })
    }

    fn stages_of(&self, order: &[IntentId]) -> Vec<Vec<IntentId>> {
        let mut level: BTreeMap<&IntentId, usize> = BTreeMap::new();
        let mut stages: Vec<Vec<IntentId>> = Vec::new();

        for id in order {
            let Some(intent) = self.intents.get(id) else {
                continue;
            };
            let depth = intent
                .prerequisites()
                .into_iter()
                .filter_map(|producer| level.get(producer))
                .map(|depth| depth + 1)
                .max()
                .unwrap_or(0);
            level.insert(id, depth);

            if stages.len() <= depth {
                stages.resize_with(depth + 1, Vec::new);
            }
            if let Some(stage) = stages.get_mut(depth) {
                stage.push(id.clone());
            }
        }
        stages
    }

    fn rank_of(&self, id: &IntentId) -> u8 {
        self.intents
            .get(id)
            .map(|intent| intent.kind.rank())
            .unwrap_or(u8::MAX)
    }

    /// Steps left after Kahn's algorithm, minus the ones that merely sit
    /// downstream of a cycle.
    fn cycle_members(&self, placed: &BTreeSet<&IntentId>) -> Vec<IntentId> {
        let mut remaining: BTreeSet<&IntentId> = self
            .intents
            .keys()
            .filter(|id| !placed.contains(id))
            .collect();

        loop {
            let feeds_remaining = |id: &IntentId| {
                self.intents.values().any(|intent| {
                    remaining.contains(&intent.id) && intent.prerequisites().contains(id)
                })
            };
            let leaves: Vec<&IntentId> = remaining
                .iter()
                .copied()
                .filter(|id| !feeds_remaining(*id))
                .collect();
            if leaves.is_empty() {
                break;
            }
            for leaf in leaves {
                remaining.remove(leaf);
            }
        }

        remaining.into_iter().cloned().collect()
    }
}

/// Validated, ordered steps.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    intents: Vec<ResourceIntent>,
    stages: Vec<Vec<IntentId>>,
}

impl Plan {
    /// Steps in execution order.
    pub fn intents(&self) -> &[ResourceIntent] {
        &self.intents
    }

    pub fn stages(&self) -> &[Vec<IntentId>] {
        &self.stages
    }

    pub fn get(&self, id: &IntentId) -> Option<&ResourceIntent> {
        self.intents.iter().find(|intent| intent.id == *id)
    }

    pub fn position(&self, id: &IntentId) -> Option<usize> {
        self.intents.iter().position(|intent| intent.id == *id)
    }

    pub fn of_kind(&self, kind: StepKind) -> impl Iterator<Item = &ResourceIntent> {
        self.intents.iter().filter(move |intent| intent.kind == kind)
    }

    /// Every step that transitively waits on `id`.
    pub fn dependents_of(&self, id: &IntentId) -> BTreeSet<IntentId> {
        let mut found: BTreeSet<IntentId> = BTreeSet::new();
        let mut frontier = vec![id.clone()];
        while let Some(current) = frontier.pop() {
            for intent in &self.intents {
                if intent.prerequisites().contains(&current) && found.insert(intent.id.clone()) {
                    frontier.push(intent.id.clone());
                }
            }
        }
        found
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use isthmus_primitives::{EndpointId, Placement, RoleArn};
    use proptest::prelude::*;

    use super::*;
    use crate::Reference;

    fn home() -> Placement {
        Placement::new("111111111111", "us-east-2")
    }

    fn away() -> Placement {
        Placement::new("222222222222", "eu-west-1")
    }

    fn step(id: &str, kind: StepKind) -> ResourceIntent {
        ResourceIntent::new(id, kind, home())
    }

    fn ids(order: &[IntentId]) -> Vec<&str> {
        order.iter().map(|id| id.as_str()).collect()
    }

    #[test]
    fn test_ties_break_by_rank_then_id() {
        let mut graph = DependencyGraph::new();
        graph.add(step("route:b", StepKind::Route)).unwrap();
        graph.add(step("segment:z", StepKind::Segment)).unwrap();
        graph.add(step("endpoint:a", StepKind::Endpoint)).unwrap();
        graph.add(step("segment:a", StepKind::Segment)).unwrap();

        let order = graph.order().unwrap();
        assert_eq!(
            ids(&order),
            vec!["segment:a", "segment:z", "endpoint:a", "route:b"]
        );
    }

    #[test]
    fn test_dependencies_come_first() {
        let mut graph = DependencyGraph::new();
        graph
            .add(step("route:a", StepKind::Route).with_dependency("peering:a->b"))
            .unwrap();
        graph
            .add(step("peering:a->b", StepKind::PeeringLink).with_dependency("segment:a"))
            .unwrap();
        graph.add(step("segment:a", StepKind::Segment)).unwrap();

        let order = graph.order().unwrap();
        assert_eq!(ids(&order), vec!["segment:a", "peering:a->b", "route:a"]);
    }

    #[test]
    fn test_duplicate_step() {
        let mut graph = DependencyGraph::new();
        graph.add(step("segment:a", StepKind::Segment)).unwrap();
        assert_matches!(
            graph.add(step("segment:a", StepKind::Segment)),
            Err(GraphError::DuplicateStep(id)) if id.as_str() == "segment:a"
        );
    }

    #[test]
    fn test_unknown_dependency() {
        let mut graph = DependencyGraph::new();
        graph
            .add(step("route:a", StepKind::Route).with_dependency("peering:ghost"))
            .unwrap();
        assert_matches!(
            graph.order(),
            Err(GraphError::UnknownDependency { missing, .. }) if missing.as_str() == "peering:ghost"
        );
    }

    #[test]
    fn test_cycle_reports_only_members() {
        let mut graph = DependencyGraph::new();
        graph.add(step("segment:a", StepKind::Segment)).unwrap();
        graph
            .add(
                step("trust-role:b", StepKind::TrustRole)
                    .with_dependency("segment:a")
                    .with_dependency("peering:a->b"),
            )
            .unwrap();
        graph
            .add(step("peering:a->b", StepKind::PeeringLink).with_dependency("trust-role:b"))
            .unwrap();
        graph
            .add(step("route:a", StepKind::Route).with_dependency("peering:a->b"))
            .unwrap();

        let result = graph.order();
        assert_matches!(result, Err(GraphError::CyclicDependency { steps }) => {
            assert_eq!(ids(&steps), vec!["peering:a->b", "trust-role:b"]);
        });
    }

    #[test]
    fn test_plain_cross_boundary_edge_is_rejected() {
        let mut graph = DependencyGraph::new();
        graph
            .add(ResourceIntent::new("trust-role:b", StepKind::TrustRole, away()))
            .unwrap();
        graph
            .add(step("peering:a->b", StepKind::PeeringLink).with_dependency("trust-role:b"))
            .unwrap();

        assert_matches!(graph.order(), Err(GraphError::ImplicitCrossBoundary { .. }));
    }

    #[test]
    fn test_reference_may_cross_boundary() {
        let mut graph = DependencyGraph::new();
        graph
            .add(ResourceIntent::new("trust-role:b", StepKind::TrustRole, away()))
            .unwrap();
        graph
            .add(
                step("peering:a->b", StepKind::PeeringLink)
                    .with_reference("role", &Reference::<RoleArn>::new("trust-role:b")),
            )
            .unwrap();

        let order = graph.order().unwrap();
        assert_eq!(ids(&order), vec!["trust-role:b", "peering:a->b"]);
    }

    #[test]
    fn test_stages_group_independent_steps() {
        let mut graph = DependencyGraph::new();
        graph.add(step("segment:a", StepKind::Segment)).unwrap();
        graph.add(step("segment:b", StepKind::Segment)).unwrap();
        graph
            .add(step("endpoint:a", StepKind::Endpoint).with_dependency("segment:a"))
            .unwrap();
        graph
            .add(step("endpoint:b", StepKind::Endpoint).with_dependency("segment:b"))
            .unwrap();
        graph
            .add(
                step("policy:api", StepKind::Policy)
                    .with_dependency("endpoint:a")
                    .with_reference("external", &Reference::<EndpointId>::new("endpoint:b")),
            )
            .unwrap();

        let stages = graph.stages().unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(ids(&stages[0]), vec!["segment:a", "segment:b"]);
        assert_eq!(ids(&stages[1]), vec!["endpoint:a", "endpoint:b"]);
        assert_eq!(ids(&stages[2]), vec!["policy:api"]);
    }

    #[test]
    fn test_plan_dependents() {
        let mut graph = DependencyGraph::new();
        graph.add(step("segment:a", StepKind::Segment)).unwrap();
        graph.add(step("segment:b", StepKind::Segment)).unwrap();
        graph
            .add(step("peering:a->b", StepKind::PeeringLink).with_dependency("segment:a"))
            .unwrap();
        graph
            .add(step("route:a", StepKind::Route).with_dependency("peering:a->b"))
            .unwrap();

        let plan = graph.into_plan().unwrap();
        assert_eq!(plan.len(), 4);
        let dependents = plan.dependents_of(&"segment:a".into());
        assert_eq!(
            dependents.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
            vec!["peering:a->b", "route:a"]
        );
        assert!(plan.dependents_of(&"segment:b".into()).is_empty());
    }

    fn dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
        (1usize..24).prop_flat_map(|n| {
            let edges = proptest::collection::vec((0..n, 0..n), 0..n * 2);
            (Just(n), edges)
        })
    }

    proptest! {
        #[test]
        fn test_order_respects_every_edge((n, edges) in dag()) {
            let kinds = [StepKind::Segment, StepKind::Endpoint, StepKind::Route, StepKind::Policy];
            let mut intents: Vec<ResourceIntent> = (0..n)
                .map(|i| step(&format!("step-{i:02}"), kinds[i % kinds.len()]))
                .collect();
            // Only lower-to-higher edges, so the graph stays acyclic
            for (a, b) in edges {
                if a < b {
                    intents[b].depends_on.insert(IntentId::new(format!("step-{a:02}")));
                }
            }

            let mut forward = DependencyGraph::new();
            let mut backward = DependencyGraph::new();
            for intent in &intents {
                forward.add(intent.clone()).unwrap();
            }
            for intent in intents.iter().rev() {
                backward.add(intent.clone()).unwrap();
            }

            let order = forward.order().unwrap();
            prop_assert_eq!(order.len(), n);
            let position: BTreeMap<&IntentId, usize> =
                order.iter().enumerate().map(|(i, id)| (id, i)).collect();
            for intent in &intents {
                for producer in &intent.depends_on {
                    prop_assert!(position[producer] < position[&intent.id]);
                }
            }
            prop_assert_eq!(order, backward.order().unwrap());
        }
    }
}
