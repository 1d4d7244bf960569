use std::sync::Arc;

use isthmus_primitives::{
    ApiId, ApiUrl, Cidr, DnsMode, EndpointId, ExecuteArn, LinkId, PolicyDocument, ResourceId,
    RoleArn, SegmentId,
};
use isthmus_topology_graph::{DependencyGraph, Plan, Reference, ResourceIntent, StepKind};
use isthmus_topology_peering::{PeeringLink, PeeringResolver, Route, TrustRoleStore};
use isthmus_topology_registry::{EndpointKey, EndpointRegistry, SegmentRegistry};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::description::{
    API_SERVICE, ApiDecl, HTTPS_PORT, INVOKE_ACTION, ProbeDecl, TopologyDescription, TrustRoleDecl,
};
use crate::{ResolveError, ResolverConfig, steps};

/// The API section after its endpoints were looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBinding {
    pub id: ApiId,
    pub segment: SegmentId,
    pub own: EndpointKey,
    pub external: Vec<EndpointKey>,
}

/// An accepter endpoint admitting HTTPS from a peered requester segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub endpoint: EndpointKey,
    pub source: SegmentId,
    pub source_cidr: Cidr,
    pub port: u16,
}

/// Everything derived from one description, ready for execution.
#[derive(Debug)]
pub struct ResolvedTopology {
    pub name: String,
    pub segments: Arc<SegmentRegistry>,
    pub endpoints: Arc<EndpointRegistry>,
    pub trust: TrustRoleStore,
    pub links: Vec<PeeringLink>,
    /// Requester-side routes, then any opted-in return routes.
    pub routes: Vec<Route>,
    pub ingress: Vec<IngressRule>,
    pub api: Option<ApiBinding>,
    pub plan: Plan,
}

impl ResolvedTopology {
    pub fn link(&self, id: &LinkId) -> Option<&PeeringLink> {
        self.links.iter().find(|link| link.id == *id)
    }

    pub fn routes_via(&self, link: &LinkId) -> impl Iterator<Item = &Route> {
        self.routes.iter().filter(move |route| route.via_link == *link)
    }
}

/// Turns a [`TopologyDescription`] into a validated, ordered plan.
///
/// Every structural error is raised here, before any engine call.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn resolve(&self, description: &TopologyDescription) -> Result<ResolvedTopology, ResolveError> {
        let mut segments = SegmentRegistry::with_config(self.config.registry);
        for decl in &description.segments {
            segments.declare(decl.clone())?;
        }
        let segments = Arc::new(segments);

        let endpoints = Arc::new(EndpointRegistry::new(Arc::clone(&segments)));
        for decl in &description.endpoints {
            endpoints.register(&decl.segment, decl.service.clone(), decl.dns)?;
        }
        let api = description
            .api
            .as_ref()
            .map(|decl| bind_api(decl, &endpoints))
            .transpose()?;

        let mut trust = TrustRoleStore::new();
        for decl in &description.trust_roles {
            segments.resolve(&decl.segment)?;
            trust.publish(&decl.segment, &decl.trusted_account);
        }

        let peering = PeeringResolver::new(&segments, &trust);
        let mut links = Vec::with_capacity(description.peerings.len());
        let mut forward_routes = Vec::new();
        let mut return_routes = Vec::new();
        for decl in &description.peerings {
            let resolution = peering.link(&decl.from, &decl.to)?;
            if decl.return_routes {
                return_routes.extend(peering.return_routes(&resolution.link)?);
            }
            forward_routes.extend(resolution.routes);
            links.push(resolution.link);
        }
        let ingress = ingress_rules(&segments, &endpoints, &links)?;

        let builder = PlanBuilder {
            segments: &segments,
            endpoints: &endpoints,
            trust: &trust,
            graph: DependencyGraph::new(),
        };
        let plan = builder.build(
            description,
            &links,
            &forward_routes,
            &return_routes,
            &ingress,
            api.as_ref(),
        )?;

        let mut routes = forward_routes;
        routes.extend(return_routes);

        info!(
            topology = %description.name,
            segments = segments.len(),
            endpoints = endpoints.len(),
            trust_roles = trust.len(),
            links = links.len(),
            routes = routes.len(),
            ingress_rules = ingress.len(),
            steps = plan.len(),
            "Resolved topology"
        );

        Ok(ResolvedTopology {
            name: description.name.clone(),
            segments,
            endpoints,
            trust,
            links,
            routes,
            ingress,
            api,
            plan,
        })
    }
}

fn bind_api(decl: &ApiDecl, endpoints: &EndpointRegistry) -> Result<ApiBinding, ResolveError> {
    // The provider's own endpoint is implied by the API section.
    let own = endpoints
        .register(&decl.segment, API_SERVICE, DnsMode::PrivateEnabled)?
        .key;

    let mut external = Vec::with_capacity(decl.authorized.len());
    for segment in &decl.authorized {
        let key = EndpointKey::new(segment.clone(), API_SERVICE);
        endpoints.get(&key)?;
        if key != own && !external.contains(&key) {
            external.push(key);
        }
    }

    Ok(ApiBinding {
        id: ApiId::new(decl.name.clone()),
        segment: decl.segment.clone(),
        own,
        external,
    })
}

/// Every endpoint in a link's accepter admits the requester's range.
fn ingress_rules(
    segments: &SegmentRegistry,
    endpoints: &EndpointRegistry,
    links: &[PeeringLink],
) -> Result<Vec<IngressRule>, ResolveError> {
    let mut rules = Vec::new();
    for link in links {
        let requester = segments.resolve(&link.requester)?;
        for endpoint in endpoints.endpoints() {
            if *endpoint.segment() != link.accepter {
                continue;
            }
            rules.push(IngressRule {
                endpoint: endpoint.key.clone(),
                source: requester.id.clone(),
                source_cidr: requester.cidr,
                port: HTTPS_PORT,
            });
        }
    }
    Ok(rules)
}

struct PlanBuilder<'a> {
    segments: &'a SegmentRegistry,
    endpoints: &'a EndpointRegistry,
    trust: &'a TrustRoleStore,
    graph: DependencyGraph,
}

impl PlanBuilder<'_> {
    fn build(
        mut self,
        description: &TopologyDescription,
        links: &[PeeringLink],
        forward_routes: &[Route],
        return_routes: &[Route],
        ingress: &[IngressRule],
        api: Option<&ApiBinding>,
    ) -> Result<Plan, ResolveError> {
        self.add_segments()?;
        self.add_endpoints()?;
        // Repeating an identical trust role declaration is harmless
        let mut planned: Vec<&TrustRoleDecl> = Vec::new();
        for decl in &description.trust_roles {
            if planned.contains(&decl) {
                continue;
            }
            self.add_trust_role(decl)?;
            planned.push(decl);
        }
        for link in links {
            self.add_link(link)?;
        }
        for route in forward_routes {
            self.add_route(route, links, false)?;
        }
        for route in return_routes {
            self.add_route(route, links, true)?;
        }
        for rule in ingress {
            self.add_ingress(rule)?;
        }
        if let Some(api) = api {
            self.add_api(api)?;
        }
        for probe in &description.probes {
            self.add_probe(probe, api, forward_routes, links, ingress)?;
        }

        Ok(self.graph.into_plan()?)
    }

    fn add_segments(&mut self) -> Result<(), ResolveError> {
        for segment in self.segments.iter() {
            let subnets: Vec<Value> = segment
                .subnets
                .iter()
                .map(|subnet| {
                    json!({
                        "id": subnet.id.as_str(),
                        "cidr": subnet.cidr.to_string(),
                        "kind": subnet.kind.to_string(),
                        "route_table": subnet.route_table_id.as_str(),
                    })
                })
                .collect();

            let intent = ResourceIntent::new(
                steps::segment(&segment.id),
                StepKind::Segment,
                segment.placement.clone(),
            )
            .with_attribute("segment", segment.id.as_str())
            .with_attribute("cidr", segment.cidr.to_string())
            .with_attribute("subnets", subnets);
            self.graph.add(intent)?;
        }
        Ok(())
    }

    fn add_endpoints(&mut self) -> Result<(), ResolveError> {
        for endpoint in self.endpoints.endpoints() {
            let segment = self.segments.resolve(endpoint.segment())?;
            let intent = ResourceIntent::new(
                steps::endpoint(&endpoint.key),
                StepKind::Endpoint,
                segment.placement.clone(),
            )
            .with_attribute("segment", segment.id.as_str())
            .with_attribute("service", endpoint.key.service.as_str())
            .with_attribute("dns", endpoint.dns_mode.to_string())
            .with_reference("network", &Reference::<ResourceId>::new(steps::segment(&segment.id)));
            self.graph.add(intent)?;
        }
        Ok(())
    }

    fn add_trust_role(&mut self, decl: &TrustRoleDecl) -> Result<(), ResolveError> {
        let accepter = self.segments.resolve(&decl.segment)?;
        let Some(role) = self.trust.find(&decl.segment, &decl.trusted_account) else {
            return Ok(());
        };

        let mut intent = ResourceIntent::new(
            steps::trust_role(&role.accepter, &role.trusted_account),
            StepKind::TrustRole,
            accepter.placement.clone(),
        )
        .with_attribute("role", role.id.as_str())
        .with_attribute("trusted_account", role.trusted_account.as_str())
        .with_attribute("actions", role.actions.clone())
        .with_dependency(steps::segment(&accepter.id));

        for over in &decl.published_over {
            let link = PeeringLink::id_for(&over.from, &over.to);
            intent = intent.with_reference(
                format!("published_over:{link}"),
                &Reference::<LinkId>::new(steps::peering(&link)),
            );
        }
        self.graph.add(intent)?;
        Ok(())
    }

    fn add_link(&mut self, link: &PeeringLink) -> Result<(), ResolveError> {
        let requester = self.segments.resolve(&link.requester)?;
        let mut intent = ResourceIntent::new(
            steps::peering(&link.id),
            StepKind::PeeringLink,
            requester.placement.clone(),
        )
        .with_attribute("link", link.id.as_str())
        .with_attribute("requester", link.requester.as_str())
        .with_attribute("accepter", link.accepter.as_str())
        .with_attribute("peer_region", link.accepter_region.as_str())
        .with_attribute("peer_account", link.accepter_account.as_str())
        .with_reference("network", &Reference::<ResourceId>::new(steps::segment(&link.requester)))
        .with_reference(
            "peer_network",
            &Reference::<ResourceId>::new(steps::segment(&link.accepter)),
        );

        if link.trust_role.is_some() {
            let role_step = steps::trust_role(&link.accepter, &requester.placement.account);
            intent = intent.with_reference("peer_role", &Reference::<RoleArn>::new(role_step));
        }
        self.graph.add(intent)?;
        Ok(())
    }

    fn add_route(
        &mut self,
        route: &Route,
        links: &[PeeringLink],
        returning: bool,
    ) -> Result<(), ResolveError> {
        let Some(link) = links.iter().find(|link| link.id == route.via_link) else {
            return Ok(());
        };
        let owner = if returning { &link.accepter } else { &link.requester };
        let segment = self.segments.resolve(owner)?;

        let intent = ResourceIntent::new(
            steps::route(&route.subnet_id, &link.id),
            StepKind::Route,
            segment.placement.clone(),
        )
        .with_attribute("subnet", route.subnet_id.as_str())
        .with_attribute("route_table", route.route_table_id.as_str())
        .with_attribute("destination_cidr", route.destination_cidr.to_string())
        .with_reference("link", &Reference::<LinkId>::new(steps::peering(&link.id)));
        self.graph.add(intent)?;
        Ok(())
    }

    fn add_ingress(&mut self, rule: &IngressRule) -> Result<(), ResolveError> {
        let accepter = self.segments.resolve(&rule.endpoint.segment)?;
        let intent = ResourceIntent::new(
            steps::ingress(&rule.endpoint, &rule.source),
            StepKind::IngressRule,
            accepter.placement.clone(),
        )
        .with_attribute("segment", accepter.id.as_str())
        .with_attribute("service", rule.endpoint.service.as_str())
        .with_attribute("source", rule.source.as_str())
        .with_attribute("source_cidr", rule.source_cidr.to_string())
        .with_attribute("protocol", "tcp")
        .with_attribute("port", rule.port)
        .with_reference("endpoint", &Reference::<EndpointId>::new(steps::endpoint(&rule.endpoint)));
        self.graph.add(intent)?;
        Ok(())
    }

    fn add_api(&mut self, api: &ApiBinding) -> Result<(), ResolveError> {
        let provider = self.segments.resolve(&api.segment)?;
        let policy_step = steps::policy(&api.id);

        let mut policy = ResourceIntent::new(
            policy_step.clone(),
            StepKind::Policy,
            provider.placement.clone(),
        )
        .with_attribute("api", api.id.as_str())
        .with_attribute("own_segment", api.own.segment.as_str())
        .with_attribute("own_service", api.own.service.as_str())
        .with_dependency(steps::endpoint(&api.own));
        for key in &api.external {
            policy = policy.with_reference(
                format!("external:{key}"),
                &Reference::<EndpointId>::new(steps::endpoint(key)),
            );
        }
        self.graph.add(policy)?;

        let mut exposed = ResourceIntent::new(
            steps::api(&api.id),
            StepKind::ExposedApi,
            provider.placement.clone(),
        )
        .with_attribute("name", api.id.as_str())
        .with_dependency(policy_step.clone())
        .with_reference("policy", &Reference::<PolicyDocument>::new(policy_step));
        for key in std::iter::once(&api.own).chain(&api.external) {
            exposed = exposed.with_reference(
                format!("endpoint:{key}"),
                &Reference::<EndpointId>::new(steps::endpoint(key)),
            );
        }
        self.graph.add(exposed)?;
        Ok(())
    }

    fn add_probe(
        &mut self,
        probe: &ProbeDecl,
        api: Option<&ApiBinding>,
        forward_routes: &[Route],
        links: &[PeeringLink],
        ingress: &[IngressRule],
    ) -> Result<(), ResolveError> {
        let Some(api) = api else {
            return Err(ResolveError::Description(format!(
                "probe in {} needs an [api] section to target",
                probe.segment
            )));
        };
        let segment = self.segments.resolve(&probe.segment)?;

        let mut intent = ResourceIntent::new(
            steps::probe(&segment.id),
            StepKind::ProbeConfig,
            segment.placement.clone(),
        )
        .with_attribute("segment", segment.id.as_str())
        .with_dependency(steps::segment(&segment.id))
        .with_reference("api_url", &Reference::<ApiUrl>::new(steps::api(&api.id)))
        .with_attribute("invoke_action", INVOKE_ACTION)
        .with_reference("invoke_resource", &Reference::<ExecuteArn>::new(steps::api(&api.id)));

        if let Some(via) = &probe.via_endpoint {
            let key = EndpointKey::new(via.clone(), API_SERVICE);
            let endpoint = self.endpoints.get(&key)?;
            intent = intent.with_attribute("dns", endpoint.dns_mode.to_string());
            if endpoint.dns_mode.requires_host_rewrite() {
                intent = intent.with_reference(
                    "endpoint_id",
                    &Reference::<EndpointId>::new(steps::endpoint(&key)),
                );
            }
            let admitted = ingress
                .iter()
                .find(|rule| rule.endpoint == key && rule.source == segment.id);
            if let Some(rule) = admitted {
                intent = intent.with_reference(
                    "ingress",
                    &Reference::<ResourceId>::new(steps::ingress(&rule.endpoint, &rule.source)),
                );
            }
        }

        // The probe needs its own segment's routes in place before it can reach
        // anything behind a peering link.
        for link in links.iter().filter(|link| link.requester == segment.id) {
            for route in forward_routes.iter().filter(|route| route.via_link == link.id) {
                intent = intent.with_dependency(steps::route(&route.subnet_id, &link.id));
            }
        }

        debug!(probe = %intent.id, "Planned probe");
        self.graph.add(intent)?;
        Ok(())
    }
}
