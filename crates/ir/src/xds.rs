use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{check_address, check_name, check_port, Validate, ValidationError};

/// Proxy-configuration plane for a gateway key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XdsIr {
    #[serde(default)]
    pub http: Vec<HttpListener>,
    #[serde(default)]
    pub tcp: Vec<TcpListener>,
    #[serde(default)]
    pub udp: Vec<UdpListener>,
    #[serde(default)]
    pub wasm: Vec<WasmExtension>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpListener {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub hostnames: Vec<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub routes: Vec<HttpRoute>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRoute {
    pub name: String,
    pub hostname: String,
    pub destination: RouteDestination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TcpListener {
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub routes: Vec<TcpRoute>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TcpRoute {
    pub name: String,
    pub destination: RouteDestination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UdpListener {
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub route: Option<UdpRoute>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UdpRoute {
    pub name: String,
    pub destination: RouteDestination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteDestination {
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<DestinationEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationEndpoint {
    pub host: String,
    pub port: u16,
}

/// Wasm module resolved to a local artifact path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmExtension {
    pub name: String,
    pub path: String,
}

impl RouteDestination {
    fn validate(&self, route: &str) -> Result<(), ValidationError> {
        check_name("destination", &self.name)?;
        for ep in &self.endpoints {
            if ep.host.is_empty() || ep.port == 0 {
                return Err(ValidationError::InvalidEndpoint {
                    route: route.to_string(),
                    endpoint: format!("{}:{}", ep.host, ep.port),
                });
            }
        }
        Ok(())
    }
}

impl Validate for XdsIr {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut listeners = HashSet::new();
        let mut claim = |name: &str| {
            if listeners.insert(name.to_string()) {
                Ok(())
            } else {
                Err(ValidationError::DuplicateListener(name.to_string()))
            }
        };

        for l in &self.http {
            check_name("http listener", &l.name)?;
            claim(&l.name)?;
            check_address(&l.name, &l.address)?;
            check_port(&l.name, l.port)?;
            if l.hostnames.is_empty() {
                return Err(ValidationError::EmptyHostnames(l.name.clone()));
            }
            let mut routes = HashSet::new();
            for r in &l.routes {
                check_name("http route", &r.name)?;
                if !routes.insert((r.name.as_str(), r.hostname.as_str())) {
                    return Err(ValidationError::DuplicateRoute { listener: l.name.clone(), route: r.name.clone() });
                }
                r.destination.validate(&r.name)?;
            }
        }
        for l in &self.tcp {
            check_name("tcp listener", &l.name)?;
            claim(&l.name)?;
            check_address(&l.name, &l.address)?;
            check_port(&l.name, l.port)?;
            let mut routes = HashSet::new();
            for r in &l.routes {
                check_name("tcp route", &r.name)?;
                if !routes.insert(r.name.as_str()) {
                    return Err(ValidationError::DuplicateRoute { listener: l.name.clone(), route: r.name.clone() });
                }
                r.destination.validate(&r.name)?;
            }
        }
        for l in &self.udp {
            check_name("udp listener", &l.name)?;
            claim(&l.name)?;
            check_address(&l.name, &l.address)?;
            check_port(&l.name, l.port)?;
            if let Some(r) = &l.route {
                check_name("udp route", &r.name)?;
                r.destination.validate(&r.name)?;
            }
        }
        for w in &self.wasm {
            check_name("wasm", &w.name)?;
        }
        Ok(())
    }
}
