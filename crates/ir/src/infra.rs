use std::collections::HashSet;

use gatesync_core::resources::ProtocolType;
use serde::{Deserialize, Serialize};

use crate::{check_address, check_name, check_port, Validate, ValidationError};

/// Infrastructure plane: what proxy fleet to run for a gateway key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfraIr {
    pub proxy: ProxyInfra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyInfra {
    pub name: String,
    pub gateway_class: String,
    #[serde(default)]
    pub listeners: Vec<ProxyListener>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyListener {
    pub name: String,
    pub ports: Vec<ListenerPort>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerPort {
    pub name: String,
    pub protocol: ProtocolType,
    pub service_port: u16,
    pub container_port: u16,
}

impl Validate for InfraIr {
    fn validate(&self) -> Result<(), ValidationError> {
        let proxy = &self.proxy;
        check_name("proxy", &proxy.name)?;
        for addr in &proxy.addresses {
            check_address(&proxy.name, addr)?;
        }
        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for l in &proxy.listeners {
            check_name("proxy listener", &l.name)?;
            if !names.insert(l.name.as_str()) {
                return Err(ValidationError::DuplicateListener(l.name.clone()));
            }
            for p in &l.ports {
                check_port(&l.name, p.service_port)?;
                check_port(&l.name, p.container_port)?;
                // UDP and TCP may share a number; the same protocol may not.
                let udp = p.protocol == ProtocolType::Udp;
                if !ports.insert((p.service_port, udp)) {
                    return Err(ValidationError::DuplicatePort { proxy: proxy.name.clone(), port: p.service_port });
                }
            }
        }
        Ok(())
    }
}
