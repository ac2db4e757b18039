//! gatesync core types: status keys, the upstream resource snapshot and status values.

#![forbid(unsafe_code)]

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

pub use kube::core::GroupVersionKind;

pub mod resources;
pub mod status;

pub use resources::{ControllerResources, Resources};
pub use status::{PolicyStatus, ResourceStatus};

/// Namespace-qualified object identity. Cluster-scoped objects carry an empty namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    pub fn from_meta(meta: &ObjectMeta) -> Self {
        Self {
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Status key for extension-provided policies, which are not statically typed:
/// the same name may be used by two different kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespacedNameAndGvk {
    pub namespaced_name: NamespacedName,
    pub gvk: GroupVersionKind,
}

impl fmt::Display for NamespacedNameAndGvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.namespaced_name, gvk_key(&self.gvk))
    }
}

/// Render a GVK as `v1/Kind` or `group/v1/Kind`.
pub fn gvk_key(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("{}/{}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
    }
}

/// Split an `apiVersion` (`v1` or `group/v1`) and kind into a GVK.
pub fn gvk_from_api_version(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    GroupVersionKind { group, version, kind: kind.to_string() }
}

/// Statically typed resource kinds that carry a status record.
///
/// Extension-provided policies are kept apart (see [`NamespacedNameAndGvk`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusKind {
    Gateway,
    HttpRoute,
    GrpcRoute,
    TlsRoute,
    TcpRoute,
    UdpRoute,
    BackendTlsPolicy,
    ClientTrafficPolicy,
    BackendTrafficPolicy,
    SecurityPolicy,
    EnvoyExtensionPolicy,
    Backend,
}

impl StatusKind {
    pub const COUNT: usize = 12;

    pub const ALL: [StatusKind; StatusKind::COUNT] = [
        StatusKind::Gateway,
        StatusKind::HttpRoute,
        StatusKind::GrpcRoute,
        StatusKind::TlsRoute,
        StatusKind::TcpRoute,
        StatusKind::UdpRoute,
        StatusKind::BackendTlsPolicy,
        StatusKind::ClientTrafficPolicy,
        StatusKind::BackendTrafficPolicy,
        StatusKind::SecurityPolicy,
        StatusKind::EnvoyExtensionPolicy,
        StatusKind::Backend,
    ];

    /// Position in [`StatusKind::ALL`]; stable for array-indexed tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Kubernetes kind name.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusKind::Gateway => "Gateway",
            StatusKind::HttpRoute => "HTTPRoute",
            StatusKind::GrpcRoute => "GRPCRoute",
            StatusKind::TlsRoute => "TLSRoute",
            StatusKind::TcpRoute => "TCPRoute",
            StatusKind::UdpRoute => "UDPRoute",
            StatusKind::BackendTlsPolicy => "BackendTLSPolicy",
            StatusKind::ClientTrafficPolicy => "ClientTrafficPolicy",
            StatusKind::BackendTrafficPolicy => "BackendTrafficPolicy",
            StatusKind::SecurityPolicy => "SecurityPolicy",
            StatusKind::EnvoyExtensionPolicy => "EnvoyExtensionPolicy",
            StatusKind::Backend => "Backend",
        }
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        StatusKind::ALL.into_iter().find(|k| k.as_str() == kind)
    }

    pub fn is_route(self) -> bool {
        matches!(
            self,
            StatusKind::HttpRoute
                | StatusKind::GrpcRoute
                | StatusKind::TlsRoute
                | StatusKind::TcpRoute
                | StatusKind::UdpRoute
        )
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
