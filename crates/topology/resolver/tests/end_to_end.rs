use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use isthmus_primitives::{ApiUrl, DnsMode, EndpointId, ExecuteArn, IntentId, LinkId, Placement};
use isthmus_topology::{
    API_SERVICE, ApiDecl, EndpointDecl, EngineError, ExecuteError, ExecutionEvent, Executor,
    ExecutorConfig, HTTPS_PORT, INVOKE_ACTION, PeeringDecl, ProbeDecl, ProvisioningEngine,
    ResolveError, Resolver, SimulatedEngine, StepOutputs, TopologyDescription, TrustRoleDecl,
    steps,
};
use isthmus_topology_graph::{
    GraphError, OutputKey, Reference, ResolvedOutputs, ResourceIntent, StepKind,
};
use isthmus_topology_peering::{LinkState, PeeringError, PeeringLink};
use isthmus_topology_policy::{Condition, Effect};
use isthmus_topology_registry::{EndpointKey, SegmentDecl};
use parking_lot::Mutex;
use tokio::sync::watch;

const ACCOUNT: &str = "111111111111";

fn segment(id: &str, cidr: &str, region: &str) -> SegmentDecl {
    SegmentDecl::new(id, cidr, Placement::new(ACCOUNT, region))
}

fn api_endpoint(segment: &str, dns: DnsMode) -> EndpointDecl {
    EndpointDecl {
        segment: segment.into(),
        service: API_SERVICE.into(),
        dns,
    }
}

fn peering(from: &str, to: &str) -> PeeringDecl {
    PeeringDecl {
        from: from.into(),
        to: to.into(),
        return_routes: false,
    }
}

fn hello_api(authorized: &[&str]) -> Option<ApiDecl> {
    Some(ApiDecl {
        name: "hello".to_owned(),
        segment: "provider".into(),
        authorized: authorized.iter().map(|s| (*s).into()).collect(),
    })
}

fn fast_polling() -> ExecutorConfig {
    ExecutorConfig::default().with_link_polling(Duration::from_millis(1), 50)
}

/// Provider and consumer in the same account and region.
fn same_region() -> TopologyDescription {
    TopologyDescription {
        name: "same-region".to_owned(),
        segments: vec![
            segment("provider", "10.2.0.0/16", "us-east-2"),
            segment("consumer", "10.1.0.0/16", "us-east-2"),
        ],
        endpoints: vec![api_endpoint("consumer", DnsMode::PrivateEnabled)],
        trust_roles: Vec::new(),
        peerings: vec![peering("consumer", "provider")],
        api: hello_api(&["consumer"]),
        probes: Vec::new(),
    }
}

/// Consumer in another region reaching the provider's API.
fn cross_region(with_trust_role: bool) -> TopologyDescription {
    TopologyDescription {
        name: "cross-region".to_owned(),
        segments: vec![
            segment("provider", "10.2.0.0/16", "us-east-2"),
            segment("consumer", "10.1.0.0/16", "eu-west-1"),
        ],
        endpoints: Vec::new(),
        trust_roles: if with_trust_role {
            vec![TrustRoleDecl {
                segment: "provider".into(),
                trusted_account: ACCOUNT.into(),
                published_over: Vec::new(),
            }]
        } else {
            Vec::new()
        },
        peerings: vec![peering("consumer", "provider")],
        api: hello_api(&[]),
        probes: vec![ProbeDecl {
            segment: "consumer".into(),
            via_endpoint: Some("provider".into()),
        }],
    }
}

/// Records every intent handed to the wrapped engine, after token binding.
#[derive(Default)]
struct RecordingEngine {
    inner: SimulatedEngine,
    seen: Mutex<Vec<ResourceIntent>>,
}

impl RecordingEngine {
    fn seen(&self, id: &IntentId) -> Option<ResourceIntent> {
        self.seen.lock().iter().find(|intent| intent.id == *id).cloned()
    }
}

#[async_trait]
impl ProvisioningEngine for RecordingEngine {
    async fn apply(&self, intent: &ResourceIntent) -> Result<StepOutputs, EngineError> {
        self.seen.lock().push(intent.clone());
        self.inner.apply(intent).await
    }

    async fn poll_link(&self, link: &LinkId) -> Result<LinkState, EngineError> {
        self.inner.poll_link(link).await
    }
}

#[tokio::test]
async fn same_region_peering_authorizes_both_endpoints() {
    let topology = Resolver::default().resolve(&same_region()).unwrap();

    assert!(topology.trust.is_empty());
    assert_eq!(topology.links.len(), 1);
    assert!(topology.links[0].trust_role.is_none());
    let isolated = topology
        .segments
        .resolve(&"consumer".into())
        .unwrap()
        .routable_subnets()
        .count();
    assert_eq!(topology.routes.len(), isolated);

    let outputs = ResolvedOutputs::new();
    let report = Executor::new(Arc::new(SimulatedEngine::new()), fast_polling())
        .execute(&topology, &outputs)
        .await
        .into_result()
        .unwrap();

    let provider = topology
        .endpoints
        .identity(&EndpointKey::new("provider", API_SERVICE))
        .unwrap();
    let consumer = topology
        .endpoints
        .identity(&EndpointKey::new("consumer", API_SERVICE))
        .unwrap();
    let expected: Vec<EndpointId> = {
        let mut ids = vec![provider, consumer];
        ids.sort();
        ids
    };

    let api = report.api.unwrap().current();
    let statements = api.policy.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0].effect, Effect::Deny);
    assert_eq!(statements[0].condition, Condition::SourceEndpointNotIn);
    assert_eq!(statements[1].effect, Effect::Allow);
    assert_eq!(statements[1].condition, Condition::SourceEndpointIn);
    for statement in &statements {
        let matched: Vec<EndpointId> = statement.matched_endpoint_ids.iter().cloned().collect();
        assert_eq!(matched, expected);
    }
    assert_eq!(
        api.bound_endpoint_ids().iter().cloned().collect::<Vec<_>>(),
        expected
    );
}

#[tokio::test]
async fn consumer_registered_after_exposure() {
    let mut description = same_region();
    description.api = hello_api(&[]);
    let topology = Resolver::default().resolve(&description).unwrap();

    let outputs = ResolvedOutputs::new();
    let report = Executor::new(Arc::new(SimulatedEngine::new()), fast_polling())
        .execute(&topology, &outputs)
        .await
        .into_result()
        .unwrap();

    let access = report.api.unwrap();
    assert_eq!(access.current().bound_endpoint_ids().len(), 1);

    let consumer = topology
        .endpoints
        .identity(&EndpointKey::new("consumer", API_SERVICE))
        .unwrap();
    let updated = access.register_consumer(consumer.clone()).unwrap();
    assert_eq!(updated.revision, 1);
    assert!(updated.policy.is_authorized(&consumer));
    assert_eq!(updated.bound_endpoint_ids().len(), 2);
}

#[tokio::test]
async fn resumed_run_applies_replaced_policy() {
    // Same-region consumer plus a partner segment with its own endpoint
    let mut description = same_region();
    description.segments.push(segment("partner", "10.3.0.0/16", "us-east-2"));
    description
        .endpoints
        .push(api_endpoint("partner", DnsMode::PrivateEnabled));

    let topology = Resolver::default().resolve(&description).unwrap();
    let outputs = ResolvedOutputs::new();
    let first = Executor::new(Arc::new(SimulatedEngine::new()), fast_polling())
        .execute(&topology, &outputs)
        .await
        .into_result()
        .unwrap();
    let consumer = topology
        .endpoints
        .identity(&EndpointKey::new("consumer", API_SERVICE))
        .unwrap();
    let partner = topology
        .endpoints
        .identity(&EndpointKey::new("partner", API_SERVICE))
        .unwrap();
    assert!(first.api.unwrap().current().policy.is_authorized(&consumer));

    // Partner added, consumer removed
    description.api = hello_api(&["partner"]);
    let topology = Resolver::default().resolve(&description).unwrap();
    let outputs = ResolvedOutputs::from_snapshot(first.outputs);
    let engine = Arc::new(RecordingEngine::default());
    let report = Executor::new(engine.clone(), fast_polling())
        .execute(&topology, &outputs)
        .await
        .into_result()
        .unwrap();

    let policy_step = steps::policy(&"hello".into());
    let api_step = steps::api(&"hello".into());
    assert!(report.reapplied.contains(&policy_step));
    assert!(report.reapplied.contains(&api_step));
    assert!(report.reused.contains(&steps::segment(&"partner".into())));

    // Identities survive the resume; only the exposed API reaches the engine again
    assert_eq!(
        topology
            .endpoints
            .identity(&EndpointKey::new("partner", API_SERVICE))
            .unwrap(),
        partner
    );
    let applied: Vec<IntentId> = engine.seen.lock().iter().map(|intent| intent.id.clone()).collect();
    assert_eq!(applied, vec![api_step.clone()]);

    let api = engine.seen(&api_step).unwrap();
    let document = api.attribute_str("policy").unwrap();
    assert!(document.contains(partner.as_str()));
    assert!(!document.contains(consumer.as_str()));
    assert_eq!(
        outputs.get(&policy_step, OutputKey::PolicyDocument).as_deref(),
        Some(document)
    );

    let access = report.api.unwrap().current();
    assert!(access.policy.is_authorized(&partner));
    assert!(!access.policy.is_authorized(&consumer));
}

#[test]
fn cross_region_peering_requires_trust_role() {
    let result = Resolver::default().resolve(&cross_region(false));
    assert_matches!(
        result,
        Err(ResolveError::Peering(PeeringError::MissingTrustRole { .. }))
    );

    let topology = Resolver::default().resolve(&cross_region(true)).unwrap();
    assert!(topology.links[0].trust_role.is_some());
}

#[tokio::test]
async fn api_url_reaches_probe_only_after_api_step() {
    let topology = Resolver::default().resolve(&cross_region(true)).unwrap();
    let api_step = steps::api(&"hello".into());
    let probe_step = steps::probe(&"consumer".into());
    let url = Reference::<ApiUrl>::new(api_step.clone());

    let outputs = ResolvedOutputs::new();
    assert_matches!(
        outputs.resolve(&url),
        Err(GraphError::UnresolvedReference { producer, .. }) if producer == api_step
    );
    assert!(topology.plan.position(&api_step) < topology.plan.position(&probe_step));

    let engine = Arc::new(RecordingEngine::default());
    let executor = Executor::new(engine.clone(), fast_polling());
    let mut events = executor.events().subscribe();
    executor
        .execute(&topology, &outputs)
        .await
        .into_result()
        .unwrap();

    let mut api_completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ExecutionEvent::StepCompleted { id } if id == api_step => api_completed = true,
            ExecutionEvent::StepStarted { id, .. } if id == probe_step => {
                assert!(api_completed, "probe started before the API existed");
            }
            _ => {}
        }
    }

    let resolved = outputs.resolve(&url).unwrap();
    let probe = engine.seen(&probe_step).unwrap();
    assert_eq!(probe.kind, StepKind::ProbeConfig);
    assert_eq!(probe.attribute_str("api_url"), Some(resolved.as_str()));
    // The provider endpoint keeps private DNS, so no host rewrite is needed
    assert!(probe.attribute_str("endpoint_id").is_none());
}

#[tokio::test]
async fn failed_link_keeps_api_branch_and_resumes() {
    let topology = Resolver::default().resolve(&same_region()).unwrap();
    let link = PeeringLink::id_for(&"consumer".into(), &"provider".into());
    let link_step = steps::peering(&link);

    let outputs = ResolvedOutputs::new();
    let engine = Arc::new(SimulatedEngine::new().fail_on(link_step.clone()));
    let report = Executor::new(engine, fast_polling())
        .execute(&topology, &outputs)
        .await;

    assert!(report.failed.contains_key(&link_step));
    assert_eq!(report.skipped.len(), topology.routes.len());
    assert!(outputs.is_completed(&steps::api(&"hello".into())));
    let snapshot = report.outputs.clone();
    assert_matches!(
        report.into_result(),
        Err(ExecuteError::ProvisioningFailed { intent_id, .. }) if intent_id == link_step
    );

    let topology = Resolver::default().resolve(&same_region()).unwrap();
    let outputs = ResolvedOutputs::from_snapshot(snapshot);
    let engine = Arc::new(SimulatedEngine::new());
    let report = Executor::new(engine.clone(), fast_polling())
        .execute(&topology, &outputs)
        .await
        .into_result()
        .unwrap();

    // Only the link and its routes are applied the second time
    assert_eq!(engine.apply_count(), 1 + topology.routes.len());
    assert_eq!(report.completed.len(), 1 + topology.routes.len());
    assert!(report.links.iter().all(|link| link.state == LinkState::Active));
}

#[tokio::test]
async fn cancelled_run_never_wires_routes() {
    let topology = Resolver::default().resolve(&same_region()).unwrap();
    let link_step = steps::peering(&PeeringLink::id_for(&"consumer".into(), &"provider".into()));

    let engine = Arc::new(SimulatedEngine::new().accept_links_after(5));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let executor = Executor::new(engine.clone(), fast_polling()).with_shutdown(shutdown_rx);

    let mut events = executor.events().subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if matches!(&event, ExecutionEvent::StepStarted { id, .. } if *id == link_step) {
                let _ = shutdown_tx.send(true);
                break;
            }
        }
    });

    let outputs = ResolvedOutputs::new();
    let report = executor.execute(&topology, &outputs).await;
    watcher.await.unwrap();

    assert!(
        !engine
            .applied()
            .iter()
            .any(|step| step.as_str().starts_with("route:"))
    );
    for route in &topology.routes {
        assert!(report.cancelled.contains(&steps::route(&route.subnet_id, &route.via_link)));
    }
    assert_matches!(report.into_result(), Err(ExecuteError::Cancelled { .. }));
}

#[tokio::test]
async fn demo_topology_wires_probe_through_connector() {
    let description =
        TopologyDescription::from_toml(include_str!("../../../../demos/vpc-test.toml")).unwrap();
    let topology = Resolver::default().resolve(&description).unwrap();

    let engine = Arc::new(RecordingEngine::default());
    let outputs = ResolvedOutputs::new();
    let report = Executor::new(engine.clone(), fast_polling())
        .execute(&topology, &outputs)
        .await
        .into_result()
        .unwrap();

    let connector = topology
        .endpoints
        .identity(&EndpointKey::new("connector", API_SERVICE))
        .unwrap();
    assert!(report.api.unwrap().current().policy.is_authorized(&connector));

    // Private DNS is disabled on the connector endpoint, so the probe gets its id
    let probe = engine.seen(&steps::probe(&"consumer".into())).unwrap();
    assert_eq!(probe.attribute_str("endpoint_id"), Some(connector.as_str()));
    assert_eq!(probe.attribute_str("dns"), Some("private-disabled"));

    // The probe may invoke the API it targets
    let invoke = outputs
        .resolve(&Reference::<ExecuteArn>::new(steps::api(&"hello".into())))
        .unwrap();
    assert_eq!(probe.attribute_str("invoke_action"), Some(INVOKE_ACTION));
    assert_eq!(probe.attribute_str("invoke_resource"), Some(invoke.as_str()));

    // The connector endpoint admits the consumer's range over HTTPS
    let ingress_step = steps::ingress(&EndpointKey::new("connector", API_SERVICE), &"consumer".into());
    let ingress = engine.seen(&ingress_step).unwrap();
    assert_eq!(ingress.kind, StepKind::IngressRule);
    assert_eq!(ingress.attribute_str("source_cidr"), Some("10.1.0.0/16"));
    assert_eq!(ingress.attributes.get("port"), Some(&serde_json::json!(HTTPS_PORT)));
    assert_eq!(ingress.attribute_str("endpoint"), Some(connector.as_str()));
    assert!(probe.attribute_str("ingress").is_some());
}
