//! gatesync IR: the two planes derived per gateway key.
//!
//! [`InfraIr`] describes the proxy fleet to provision; [`XdsIr`] describes the
//! proxy configuration to render. Both are produced together for a key and
//! validated before they are published.

#![forbid(unsafe_code)]

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

pub mod infra;
pub mod xds;

pub use infra::{InfraIr, ListenerPort, ProxyInfra, ProxyListener};
pub use xds::{
    DestinationEndpoint, HttpListener, HttpRoute, RouteDestination, TcpListener, TcpRoute, UdpListener,
    UdpRoute, WasmExtension, XdsIr,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} name must not be empty")]
    EmptyName(&'static str),
    #[error("listener {listener}: invalid address {address:?}")]
    InvalidAddress { listener: String, address: String },
    #[error("listener {listener}: port must be non-zero")]
    InvalidPort { listener: String },
    #[error("duplicate listener {0}")]
    DuplicateListener(String),
    #[error("duplicate port {port} on proxy {proxy}")]
    DuplicatePort { proxy: String, port: u16 },
    #[error("listener {0}: at least one hostname is required")]
    EmptyHostnames(String),
    #[error("listener {listener}: duplicate route {route}")]
    DuplicateRoute { listener: String, route: String },
    #[error("route {route}: invalid endpoint {endpoint}")]
    InvalidEndpoint { route: String, endpoint: String },
    #[error("{plane} ir: {source}")]
    Plane {
        plane: &'static str,
        #[source]
        source: Box<ValidationError>,
    },
}

/// Structural validation run before an artifact is published.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Render an IR value as YAML for logs.
pub fn yaml_string<T: Serialize>(v: &T) -> String {
    serde_yaml::to_string(v).unwrap_or_else(|e| format!("<unrenderable: {e}>"))
}

pub(crate) fn check_name(kind: &'static str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName(kind));
    }
    Ok(())
}

pub(crate) fn check_address(listener: &str, address: &str) -> Result<(), ValidationError> {
    address.parse::<IpAddr>().map(|_| ()).map_err(|_| ValidationError::InvalidAddress {
        listener: listener.to_string(),
        address: address.to_string(),
    })
}

pub(crate) fn check_port(listener: &str, port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        return Err(ValidationError::InvalidPort { listener: listener.to_string() });
    }
    Ok(())
}

/// One IR entry: both planes for a single gateway key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayIr {
    pub infra: InfraIr,
    pub xds: XdsIr,
}

impl Validate for GatewayIr {
    fn validate(&self) -> Result<(), ValidationError> {
        self.infra
            .validate()
            .map_err(|e| ValidationError::Plane { plane: "infra", source: Box::new(e) })?;
        self.xds
            .validate()
            .map_err(|e| ValidationError::Plane { plane: "xds", source: Box::new(e) })
    }
}
