//! Reference translator: gateways of the bundle's class become IR entries,
//! routes attach to their listeners, policies report against the gateways
//! they reach.

use std::collections::HashMap;

use gatesync_core::resources::{Gateway, Listener, ParentReference, Policy, PolicyTargetReference, ProtocolType, Route};
use gatesync_core::status::{
    condition, BackendStatus, GatewayStatus, ListenerStatus, PolicyAncestorStatus, RouteParentStatus, RouteStatus,
    CONDITION_ACCEPTED, CONDITION_PROGRAMMED, CONDITION_RESOLVED_REFS,
};
use gatesync_core::{gvk_from_api_version, NamespacedName, PolicyStatus, ResourceStatus, Resources, StatusKind};
use gatesync_ir::{
    DestinationEndpoint, GatewayIr, HttpListener, HttpRoute, InfraIr, ListenerPort, ProxyInfra, ProxyListener,
    RouteDestination, TcpListener, TcpRoute, UdpListener, UdpRoute, WasmExtension, XdsIr,
};
use tracing::debug;

use crate::{TranslateOptions, TranslationError, TranslationResult, Translator};

const LISTENER_ADDRESS: &str = "0.0.0.0";
/// Privileged service ports are shifted by this much inside the proxy.
const PRIVILEGED_PORT_OFFSET: u16 = 10000;

#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayTranslator;

impl GatewayTranslator {
    pub fn new() -> Self {
        Self
    }
}

struct Managed<'a> {
    gw: &'a Gateway,
    key: NamespacedName,
    ir_key: String,
    attached: Vec<i32>,
}

type AcceptedRoutes = HashMap<(StatusKind, NamespacedName), Vec<ParentReference>>;

fn container_port(port: u16) -> u16 {
    if port < 1024 {
        port + PRIVILEGED_PORT_OFFSET
    } else {
        port
    }
}

fn listener_name(gw: &NamespacedName, l: &Listener) -> String {
    format!("{}/{}/{}", gw.namespace, gw.name, l.name)
}

fn accepts(kind: StatusKind, protocol: ProtocolType) -> bool {
    match kind {
        StatusKind::HttpRoute | StatusKind::GrpcRoute => matches!(protocol, ProtocolType::Http | ProtocolType::Https),
        StatusKind::TlsRoute => protocol == ProtocolType::Tls,
        StatusKind::TcpRoute => protocol == ProtocolType::Tcp,
        StatusKind::UdpRoute => protocol == ProtocolType::Udp,
        _ => false,
    }
}

fn gateway_ref(gw: &NamespacedName, section_name: Option<String>) -> ParentReference {
    ParentReference {
        group: None,
        kind: Some("Gateway".to_string()),
        namespace: Some(gw.namespace.clone()),
        name: gw.name.clone(),
        section_name,
    }
}

fn push_unique(refs: &mut Vec<ParentReference>, r: ParentReference) {
    if !refs.contains(&r) {
        refs.push(r);
    }
}

fn route_lists(res: &Resources) -> [(StatusKind, &Vec<Route>); 5] {
    [
        (StatusKind::HttpRoute, &res.http_routes),
        (StatusKind::GrpcRoute, &res.grpc_routes),
        (StatusKind::TlsRoute, &res.tls_routes),
        (StatusKind::TcpRoute, &res.tcp_routes),
        (StatusKind::UdpRoute, &res.udp_routes),
    ]
}

fn policy_lists(res: &Resources) -> [(StatusKind, &Vec<Policy>); 5] {
    [
        (StatusKind::ClientTrafficPolicy, &res.client_traffic_policies),
        (StatusKind::BackendTrafficPolicy, &res.backend_traffic_policies),
        (StatusKind::SecurityPolicy, &res.security_policies),
        (StatusKind::EnvoyExtensionPolicy, &res.envoy_extension_policies),
        (StatusKind::BackendTlsPolicy, &res.backend_tls_policies),
    ]
}

impl Translator for GatewayTranslator {
    fn translate(&self, res: &Resources, opts: &TranslateOptions<'_>) -> TranslationResult {
        let mut out = TranslationResult::default();
        let mut managed = self.process_gateways(res, opts, &mut out);

        let mut accepted = AcceptedRoutes::new();
        for (kind, routes) in route_lists(res) {
            for route in routes {
                self.process_route(kind, route, res, opts, &mut managed, &mut accepted, &mut out);
            }
        }
        self.gateway_statuses(&managed, &mut out);

        for (kind, policies) in policy_lists(res) {
            for policy in policies {
                self.process_policy(kind, policy, res, opts, &managed, &accepted, &mut out);
            }
        }
        self.process_backends(res, opts, &mut out);
        self.process_extension_policies(res, opts, &managed, &mut out);
        out
    }
}

impl GatewayTranslator {
    fn process_gateways<'a>(
        &self,
        res: &'a Resources,
        opts: &TranslateOptions<'_>,
        out: &mut TranslationResult,
    ) -> Vec<Managed<'a>> {
        let mut managed = Vec::new();
        for gw in &res.gateways {
            let key = NamespacedName::from_meta(&gw.metadata);
            if opts.gateway_class_name.is_empty() || gw.spec.gateway_class_name != opts.gateway_class_name {
                debug!(gateway = %key, class = %gw.spec.gateway_class_name, "gateway not managed by this class");
                out.push_status(StatusKind::Gateway, key, None);
                continue;
            }
            let ir_key = if opts.merge_gateways { opts.gateway_class_name.clone() } else { key.to_string() };
            let ir = out.ir.entry(ir_key.clone()).or_insert_with(|| GatewayIr {
                infra: InfraIr {
                    proxy: ProxyInfra {
                        name: ir_key.clone(),
                        gateway_class: opts.gateway_class_name.clone(),
                        ..Default::default()
                    },
                },
                xds: XdsIr::default(),
            });
            for a in &gw.spec.addresses {
                if !ir.infra.proxy.addresses.contains(&a.value) {
                    ir.infra.proxy.addresses.push(a.value.clone());
                }
            }

            let mut ports = Vec::with_capacity(gw.spec.listeners.len());
            for l in &gw.spec.listeners {
                let name = listener_name(&key, l);
                let port = container_port(l.port);
                ports.push(ListenerPort { name: name.clone(), protocol: l.protocol, service_port: l.port, container_port: port });
                let address = LISTENER_ADDRESS.to_string();
                match l.protocol {
                    ProtocolType::Http | ProtocolType::Https => ir.xds.http.push(HttpListener {
                        name,
                        address,
                        port,
                        hostnames: vec![l.hostname.clone().unwrap_or_else(|| "*".to_string())],
                        tls: l.protocol == ProtocolType::Https,
                        routes: Vec::new(),
                    }),
                    ProtocolType::Tls | ProtocolType::Tcp => ir.xds.tcp.push(TcpListener {
                        name,
                        address,
                        port,
                        tls: l.protocol == ProtocolType::Tls,
                        routes: Vec::new(),
                    }),
                    ProtocolType::Udp => ir.xds.udp.push(UdpListener { name, address, port, route: None }),
                }
            }
            ir.infra.proxy.listeners.push(ProxyListener { name: key.to_string(), ports });
            managed.push(Managed { gw, key, ir_key, attached: vec![0; gw.spec.listeners.len()] });
        }
        managed
    }

    /// Destinations per rule, and whether every backend reference resolved.
    fn destinations(
        &self,
        route_label: &str,
        route: &Route,
        route_ns: &str,
        res: &Resources,
        opts: &TranslateOptions<'_>,
        errors: &mut Vec<TranslationError>,
    ) -> (Vec<RouteDestination>, bool) {
        let mut resolved = true;
        let mut out = Vec::with_capacity(route.spec.rules.len());
        for (i, rule) in route.spec.rules.iter().enumerate() {
            let mut endpoints = Vec::new();
            for br in &rule.backend_refs {
                let ns = br.namespace.as_deref().unwrap_or(route_ns);
                let backend = format!("{}/{}", ns, br.name);
                match br.kind.as_deref() {
                    Some("Backend") => {
                        let wanted = NamespacedName::new(ns, br.name.clone());
                        let found = if opts.flags.backend_enabled {
                            res.backends.iter().find(|b| NamespacedName::from_meta(&b.metadata) == wanted)
                        } else {
                            None
                        };
                        match found {
                            Some(b) => endpoints.extend(
                                b.spec.endpoints.iter().map(|e| DestinationEndpoint { host: e.host.clone(), port: e.port }),
                            ),
                            None => {
                                resolved = false;
                                errors.push(TranslationError::UnknownBackend { route: route_label.to_string(), backend });
                            }
                        }
                    }
                    _ => match br.port {
                        Some(port) => endpoints.push(DestinationEndpoint { host: format!("{}.{}", br.name, ns), port }),
                        None => {
                            resolved = false;
                            errors.push(TranslationError::MissingBackendPort { route: route_label.to_string(), backend });
                        }
                    },
                }
            }
            out.push(RouteDestination { name: format!("{route_label}/rule/{i}"), endpoints });
        }
        (out, resolved)
    }

    #[allow(clippy::too_many_arguments)]
    fn process_route(
        &self,
        kind: StatusKind,
        route: &Route,
        res: &Resources,
        opts: &TranslateOptions<'_>,
        managed: &mut [Managed<'_>],
        accepted: &mut AcceptedRoutes,
        out: &mut TranslationResult,
    ) {
        let key = NamespacedName::from_meta(&route.metadata);
        let generation = route.metadata.generation;
        let route_label = format!("{}/{}", kind.as_str().to_lowercase(), key);
        let (dests, resolved) = self.destinations(&route_label, route, &key.namespace, res, opts, &mut out.errors);

        let mut parents = Vec::new();
        let mut accepted_refs = Vec::new();
        for pr in &route.spec.parent_refs {
            let Some(m) = managed.iter_mut().find(|m| pr.targets_gateway(&key.namespace, &m.key)) else {
                continue;
            };
            let gw = m.gw;
            let mut attached_any = false;
            for (i, l) in gw.spec.listeners.iter().enumerate() {
                if pr.section_name.as_deref().is_some_and(|s| s != l.name) || !accepts(kind, l.protocol) {
                    continue;
                }
                let Some(ir) = out.ir.get_mut(&m.ir_key) else { continue };
                let lname = listener_name(&m.key, l);
                match attach(kind, &route_label, route, l, &lname, &dests, &mut ir.xds) {
                    Ok(()) => {
                        attached_any = true;
                        m.attached[i] += 1;
                    }
                    Err(e) => out.errors.push(e),
                }
            }

            let mut conditions = Vec::with_capacity(2);
            if attached_any {
                conditions.push(condition(CONDITION_ACCEPTED, true, "Accepted", "Route is accepted", generation));
                conditions.push(condition(
                    CONDITION_RESOLVED_REFS,
                    resolved,
                    if resolved { "ResolvedRefs" } else { "BackendNotFound" },
                    if resolved { "Resolved all the Object references for the Route" } else { "Some backend references could not be resolved" },
                    generation,
                ));
                push_unique(&mut accepted_refs, gateway_ref(&m.key, pr.section_name.clone()));
            } else {
                conditions.push(condition(
                    CONDITION_ACCEPTED,
                    false,
                    "NotAllowedByListeners",
                    "No listener of the parent accepts this route",
                    generation,
                ));
            }
            parents.push(RouteParentStatus {
                parent_ref: pr.clone(),
                controller_name: opts.flags.controller_name.clone(),
                conditions,
            });
        }

        if !accepted_refs.is_empty() {
            accepted.insert((kind, key.clone()), accepted_refs);
        }
        let status = (!parents.is_empty()).then(|| ResourceStatus::Route(RouteStatus { parents }));
        out.push_status(kind, key, status);
    }

    fn gateway_statuses(&self, managed: &[Managed<'_>], out: &mut TranslationResult) {
        for m in managed {
            let generation = m.gw.metadata.generation;
            let listeners = m
                .gw
                .spec
                .listeners
                .iter()
                .zip(&m.attached)
                .map(|(l, n)| ListenerStatus {
                    name: l.name.clone(),
                    attached_routes: *n,
                    conditions: vec![
                        condition(CONDITION_ACCEPTED, true, "Accepted", "Listener is accepted", generation),
                        condition(CONDITION_PROGRAMMED, true, "Programmed", "Listener is programmed", generation),
                    ],
                })
                .collect();
            let programmed = !m.gw.spec.listeners.is_empty();
            let status = GatewayStatus {
                addresses: m.gw.spec.addresses.iter().map(|a| a.value.clone()).collect(),
                conditions: vec![
                    condition(CONDITION_ACCEPTED, true, "Accepted", "The Gateway has been scheduled", generation),
                    condition(
                        CONDITION_PROGRAMMED,
                        programmed,
                        if programmed { "Programmed" } else { "NoListeners" },
                        if programmed { "Sending translated listeners to the data plane" } else { "Gateway has no listeners" },
                        generation,
                    ),
                ],
                listeners,
            };
            out.push_status(StatusKind::Gateway, m.key.clone(), Some(ResourceStatus::Gateway(status)));
        }
    }

    fn policy_ancestors(
        &self,
        ns: &str,
        targets: &[&PolicyTargetReference],
        res: &Resources,
        managed: &[Managed<'_>],
        accepted: &AcceptedRoutes,
    ) -> Vec<ParentReference> {
        let mut ancestors = Vec::new();
        for t in targets {
            let target = NamespacedName::new(ns, t.name.clone());
            match t.kind.as_str() {
                "Gateway" => {
                    if managed.iter().any(|m| m.key == target) {
                        push_unique(&mut ancestors, gateway_ref(&target, t.section_name.clone()));
                    }
                }
                "Service" => {
                    for (kind, routes) in route_lists(res) {
                        for route in routes {
                            let rk = NamespacedName::from_meta(&route.metadata);
                            let uses = route.spec.rules.iter().flat_map(|r| r.backend_refs.iter()).any(|br| {
                                br.kind.as_deref().map_or(true, |k| k == "Service")
                                    && br.name == t.name
                                    && br.namespace.as_deref().unwrap_or(&rk.namespace) == ns
                            });
                            if uses {
                                for r in accepted.get(&(kind, rk)).into_iter().flatten() {
                                    push_unique(&mut ancestors, r.clone());
                                }
                            }
                        }
                    }
                }
                other => {
                    if let Some(kind) = StatusKind::from_kind(other).filter(|k| k.is_route()) {
                        for r in accepted.get(&(kind, target)).into_iter().flatten() {
                            push_unique(&mut ancestors, r.clone());
                        }
                    }
                }
            }
        }
        ancestors
    }

    #[allow(clippy::too_many_arguments)]
    fn process_policy(
        &self,
        kind: StatusKind,
        policy: &Policy,
        res: &Resources,
        opts: &TranslateOptions<'_>,
        managed: &[Managed<'_>],
        accepted: &AcceptedRoutes,
        out: &mut TranslationResult,
    ) {
        let key = NamespacedName::from_meta(&policy.metadata);
        let generation = policy.metadata.generation;
        let targets: Vec<_> = policy.spec.all_targets().collect();
        let ancestors = self.policy_ancestors(&key.namespace, &targets, res, managed, accepted);
        if ancestors.is_empty() {
            // Target not found (or not ours): no status opinion this round.
            debug!(policy = %key, kind = %kind, "policy target not found");
            out.push_status(kind, key, None);
            return;
        }

        let mut accepted_cond = condition(CONDITION_ACCEPTED, true, "Accepted", "Policy has been accepted.", generation);
        if kind == StatusKind::EnvoyExtensionPolicy && !policy.spec.wasm.is_empty() {
            let mut unresolved = Vec::new();
            for (i, w) in policy.spec.wasm.iter().enumerate() {
                let path = opts.artifacts.as_ref().and_then(|a| a.resolve(&w.url));
                let Some(path) = path else {
                    unresolved.push(w.url.clone());
                    out.errors.push(TranslationError::UnresolvedArtifact { policy: key.to_string(), url: w.url.clone() });
                    continue;
                };
                let ext = WasmExtension { name: w.name.clone().unwrap_or_else(|| format!("{key}/wasm/{i}")), path };
                for anc in &ancestors {
                    let gw = NamespacedName::new(anc.namespace.clone().unwrap_or_default(), anc.name.clone());
                    let Some(m) = managed.iter().find(|m| m.key == gw) else { continue };
                    if let Some(ir) = out.ir.get_mut(&m.ir_key) {
                        if !ir.xds.wasm.contains(&ext) {
                            ir.xds.wasm.push(ext.clone());
                        }
                    }
                }
            }
            if !unresolved.is_empty() {
                accepted_cond = condition(
                    CONDITION_ACCEPTED,
                    false,
                    "Invalid",
                    format!("Wasm module(s) could not be resolved: {}", unresolved.join(", ")),
                    generation,
                );
            }
        }

        let status = PolicyStatus {
            ancestors: ancestors
                .into_iter()
                .map(|a| PolicyAncestorStatus {
                    ancestor_ref: a,
                    controller_name: opts.flags.controller_name.clone(),
                    conditions: vec![accepted_cond.clone()],
                })
                .collect(),
        };
        out.push_status(kind, key, Some(ResourceStatus::Policy(status)));
    }

    fn process_backends(&self, res: &Resources, opts: &TranslateOptions<'_>, out: &mut TranslationResult) {
        for b in &res.backends {
            let key = NamespacedName::from_meta(&b.metadata);
            let generation = b.metadata.generation;
            let status = opts.flags.backend_enabled.then(|| {
                let ok = !b.spec.endpoints.is_empty();
                ResourceStatus::Backend(BackendStatus {
                    conditions: vec![condition(
                        CONDITION_ACCEPTED,
                        ok,
                        if ok { "Accepted" } else { "Invalid" },
                        if ok { "The Backend was accepted" } else { "The Backend has no endpoints" },
                        generation,
                    )],
                })
            });
            out.push_status(StatusKind::Backend, key, status);
        }
    }

    fn process_extension_policies(
        &self,
        res: &Resources,
        opts: &TranslateOptions<'_>,
        managed: &[Managed<'_>],
        out: &mut TranslationResult,
    ) {
        for obj in &res.extension_server_policies {
            let mut obj = obj.clone();
            if !obj.data.is_object() {
                obj.data = serde_json::Value::Object(Default::default());
            }
            if let Some(map) = obj.data.as_object_mut() {
                map.remove("status");
            }

            let registered = obj
                .types
                .as_ref()
                .map(|t| gvk_from_api_version(&t.api_version, &t.kind))
                .is_some_and(|g| {
                    opts.flags.extension_group_kinds.iter().any(|gk| gk.group == g.group && gk.kind == g.kind)
                });
            if registered {
                let ns = obj.metadata.namespace.clone().unwrap_or_default();
                let ancestors: Vec<ParentReference> = extension_targets(&obj.data)
                    .into_iter()
                    .filter(|t| t.kind == "Gateway")
                    .map(|t| NamespacedName::new(ns.clone(), t.name))
                    .filter(|gw| managed.iter().any(|m| &m.key == gw))
                    .map(|gw| gateway_ref(&gw, None))
                    .collect();
                if !ancestors.is_empty() {
                    let generation = obj.metadata.generation;
                    let status = PolicyStatus {
                        ancestors: ancestors
                            .into_iter()
                            .map(|a| PolicyAncestorStatus {
                                ancestor_ref: a,
                                controller_name: opts.flags.controller_name.clone(),
                                conditions: vec![condition(
                                    CONDITION_ACCEPTED,
                                    true,
                                    "Accepted",
                                    "Policy has been accepted.",
                                    generation,
                                )],
                            })
                            .collect(),
                    };
                    if let (Ok(v), Some(map)) = (serde_json::to_value(&status), obj.data.as_object_mut()) {
                        map.insert("status".to_string(), v);
                    }
                }
            }
            out.extension_server_policies.push(obj);
        }
    }
}

fn attach(
    kind: StatusKind,
    route_label: &str,
    route: &Route,
    listener: &Listener,
    lname: &str,
    dests: &[RouteDestination],
    xds: &mut XdsIr,
) -> Result<(), TranslationError> {
    match kind {
        StatusKind::HttpRoute | StatusKind::GrpcRoute => {
            let Some(hl) = xds.http.iter_mut().find(|h| h.name == lname) else { return Ok(()) };
            let hostnames: Vec<String> = if route.spec.hostnames.is_empty() {
                vec![listener.hostname.clone().unwrap_or_else(|| "*".to_string())]
            } else {
                route.spec.hostnames.clone()
            };
            for d in dests {
                for host in &hostnames {
                    if hl.routes.iter().any(|r| r.name == d.name && &r.hostname == host) {
                        continue;
                    }
                    hl.routes.push(HttpRoute { name: d.name.clone(), hostname: host.clone(), destination: d.clone() });
                }
            }
        }
        StatusKind::TlsRoute | StatusKind::TcpRoute => {
            let Some(tl) = xds.tcp.iter_mut().find(|t| t.name == lname) else { return Ok(()) };
            for d in dests {
                if tl.routes.iter().any(|r| r.name == d.name) {
                    continue;
                }
                tl.routes.push(TcpRoute { name: d.name.clone(), destination: d.clone() });
            }
        }
        StatusKind::UdpRoute => {
            let Some(ul) = xds.udp.iter_mut().find(|u| u.name == lname) else { return Ok(()) };
            let Some(d) = dests.first() else { return Ok(()) };
            match &ul.route {
                Some(existing) if existing.name != d.name => {
                    return Err(TranslationError::ListenerConflict {
                        route: route_label.to_string(),
                        listener: lname.to_string(),
                    });
                }
                _ => ul.route = Some(UdpRoute { name: d.name.clone(), destination: d.clone() }),
            }
        }
        _ => {}
    }
    Ok(())
}

fn extension_targets(data: &serde_json::Value) -> Vec<PolicyTargetReference> {
    let spec = &data["spec"];
    let mut out: Vec<PolicyTargetReference> = serde_json::from_value(spec["targetRefs"].clone()).unwrap_or_default();
    if let Ok(single) = serde_json::from_value::<PolicyTargetReference>(spec["targetRef"].clone()) {
        out.push(single);
    }
    out
}
