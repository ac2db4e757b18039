//! Upstream routing resources as delivered by the provider.
//!
//! Only the fields the translation step reads are modelled; everything else in
//! the upstream objects is ignored on deserialisation.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};

use crate::NamespacedName;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayClass {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: GatewayClassSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayClassSpec {
    #[serde(default)]
    pub controller_name: String,
}

/// Proxy parameters attached to a gateway class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyProxy {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: EnvoyProxySpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyProxySpec {
    /// Serve every gateway of the class from one proxy fleet.
    #[serde(default)]
    pub merge_gateways: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtocolType {
    Http,
    Https,
    Tls,
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: GatewaySpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    #[serde(default)]
    pub gateway_class_name: String,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default)]
    pub addresses: Vec<GatewayAddress>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    #[serde(default)]
    pub hostname: Option<String>,
    pub port: u16,
    pub protocol: ProtocolType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAddress {
    pub value: String,
}

/// Shared shape of HTTPRoute, GRPCRoute, TLSRoute, TCPRoute and UDPRoute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: RouteSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,
    #[serde(default)]
    pub hostnames: Vec<String>,
    #[serde(default)]
    pub rules: Vec<RouteRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    #[serde(default)]
    pub backend_refs: Vec<BackendRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl ParentReference {
    /// Whether this reference addresses the gateway `gw`, defaulting the
    /// namespace to the referring object's.
    pub fn targets_gateway(&self, from_namespace: &str, gw: &NamespacedName) -> bool {
        let kind_ok = self.kind.as_deref().map_or(true, |k| k == "Gateway");
        let ns = self.namespace.as_deref().unwrap_or(from_namespace);
        kind_ok && ns == gw.namespace && self.name == gw.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    #[serde(default)]
    pub kind: Option<String>,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub weight: Option<u32>,
}

/// Shared shape of the attachable policies (ClientTrafficPolicy, BackendTrafficPolicy,
/// SecurityPolicy, EnvoyExtensionPolicy and BackendTLSPolicy).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PolicySpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(default)]
    pub target_ref: Option<PolicyTargetReference>,
    #[serde(default)]
    pub target_refs: Vec<PolicyTargetReference>,
    /// Wasm extensions (EnvoyExtensionPolicy only).
    #[serde(default)]
    pub wasm: Vec<WasmRef>,
}

impl PolicySpec {
    pub fn all_targets(&self) -> impl Iterator<Item = &PolicyTargetReference> {
        self.target_ref.iter().chain(self.target_refs.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTargetReference {
    #[serde(default)]
    pub group: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub section_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasmRef {
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: BackendSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSpec {
    #[serde(default)]
    pub endpoints: Vec<BackendEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendEndpoint {
    pub host: String,
    pub port: u16,
}

/// One bundle: every upstream resource sharing a gateway class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    #[serde(default)]
    pub gateway_class: Option<GatewayClass>,
    #[serde(default)]
    pub envoy_proxy: Option<EnvoyProxy>,
    #[serde(default)]
    pub gateways: Vec<Gateway>,
    #[serde(default, rename = "httpRoutes")]
    pub http_routes: Vec<Route>,
    #[serde(default, rename = "grpcRoutes")]
    pub grpc_routes: Vec<Route>,
    #[serde(default, rename = "tlsRoutes")]
    pub tls_routes: Vec<Route>,
    #[serde(default, rename = "tcpRoutes")]
    pub tcp_routes: Vec<Route>,
    #[serde(default, rename = "udpRoutes")]
    pub udp_routes: Vec<Route>,
    #[serde(default, rename = "backendTLSPolicies")]
    pub backend_tls_policies: Vec<Policy>,
    #[serde(default)]
    pub client_traffic_policies: Vec<Policy>,
    #[serde(default)]
    pub backend_traffic_policies: Vec<Policy>,
    #[serde(default)]
    pub security_policies: Vec<Policy>,
    #[serde(default)]
    pub envoy_extension_policies: Vec<Policy>,
    #[serde(default)]
    pub backends: Vec<Backend>,
    /// Extension-provided policies; their kinds are only known at runtime.
    #[serde(default)]
    pub extension_server_policies: Vec<DynamicObject>,
}

impl Resources {
    /// Name of the bundle's gateway class, empty when the bundle has none.
    pub fn gateway_class_name(&self) -> String {
        self.gateway_class
            .as_ref()
            .and_then(|gc| gc.metadata.name.clone())
            .unwrap_or_default()
    }

    pub fn merge_gateways_enabled(&self) -> bool {
        self.envoy_proxy
            .as_ref()
            .and_then(|ep| ep.spec.merge_gateways)
            .unwrap_or(false)
    }
}

/// Whole-state snapshot for one controller: bundles in provider order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerResources(pub Vec<Resources>);

impl ControllerResources {
    pub fn iter(&self) -> std::slice::Iter<'_, Resources> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Resources>> for ControllerResources {
    fn from(v: Vec<Resources>) -> Self {
        Self(v)
    }
}

impl<'a> IntoIterator for &'a ControllerResources {
    type Item = &'a Resources;
    type IntoIter = std::slice::Iter<'a, Resources>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
