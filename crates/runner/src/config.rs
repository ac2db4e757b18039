//! Server configuration: a YAML file with defaults for every field, plus a
//! small set of environment overrides.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use gatesync_core::GroupVersionKind;
use gatesync_translate::{GroupKind, TranslatorFlags};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "gatesync-system";
pub const DEFAULT_CONTROLLER_NAME: &str = "gatesync.io/gatewayclass-controller";
pub const DEFAULT_CACHE_DIR: &str = "/var/lib/gatesync/wasm";
pub const DEFAULT_HMAC_SECRET_NAME: &str = "envoy-oidc-hmac";
pub const DEFAULT_HMAC_SECRET_KEY: &str = "hmac-secret";
pub const DEFAULT_TLS_CERT: &str = "/certs/tls.crt";
pub const DEFAULT_TLS_KEY: &str = "/certs/tls.key";
pub const DEFAULT_TLS_CA: &str = "/certs/ca.crt";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid {var}={value}; expected host:port")]
    Env { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub namespace: String,
    pub gateway: GatewayConfig,
    pub rate_limit: Option<RateLimit>,
    pub extension_apis: Option<ExtensionApis>,
    pub extension_manager: Option<ExtensionManager>,
    pub artifact_cache: ArtifactCacheConfig,
    pub telemetry: Telemetry,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            gateway: GatewayConfig::default(),
            rate_limit: None,
            extension_apis: None,
            extension_manager: None,
            artifact_cache: ArtifactCacheConfig::default(),
            telemetry: Telemetry::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    pub controller_name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { controller_name: DEFAULT_CONTROLLER_NAME.to_string() }
    }
}

/// Presence enables global rate limiting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimit {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtensionApis {
    pub enable_envoy_patch_policy: bool,
    pub enable_backend: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtensionManager {
    /// Policy kinds served by the extension; their statuses are tracked.
    pub resources: Vec<GroupVersionKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArtifactCacheConfig {
    /// Acquire the cache capabilities at startup.
    pub enabled: bool,
    pub cache_dir: PathBuf,
    pub hmac_secret_name: String,
    pub hmac_secret_key: String,
    pub tls: TlsPaths,
}

impl Default for ArtifactCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            hmac_secret_name: DEFAULT_HMAC_SECRET_NAME.to_string(),
            hmac_secret_key: DEFAULT_HMAC_SECRET_KEY.to_string(),
            tls: TlsPaths::default(),
        }
    }
}

/// Log filter and Prometheus listener for the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Telemetry {
    /// `tracing_subscriber::EnvFilter` directive.
    pub log_filter: String,
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self { log_filter: DEFAULT_LOG_FILTER.to_string(), metrics_addr: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca: PathBuf,
}

impl Default for TlsPaths {
    fn default() -> Self {
        Self {
            cert: PathBuf::from(DEFAULT_TLS_CERT),
            key: PathBuf::from(DEFAULT_TLS_KEY),
            ca: PathBuf::from(DEFAULT_TLS_CA),
        }
    }
}

impl ServerConfig {
    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    /// Load `path`, or defaults when no path is given. Environment overrides
    /// are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).map_err(|source| ConfigError::Read { path: p.to_path_buf(), source })?;
                Self::from_yaml(&raw).map_err(|source| ConfigError::Parse { path: p.to_path_buf(), source })?
            }
            None => Self::default(),
        };
        cfg.apply_env(|var| std::env::var(var).ok())?;
        Ok(cfg)
    }

    /// `GATESYNC_NAMESPACE`, `GATESYNC_LOG` and `GATESYNC_METRICS_ADDR`
    /// override the file when set and non-empty.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.is_empty());
        if let Some(ns) = get("GATESYNC_NAMESPACE") {
            self.namespace = ns;
        }
        if let Some(filter) = get("GATESYNC_LOG") {
            self.telemetry.log_filter = filter;
        }
        if let Some(addr) = get("GATESYNC_METRICS_ADDR") {
            let parsed = addr.parse().map_err(|_| ConfigError::Env { var: "GATESYNC_METRICS_ADDR", value: addr.clone() })?;
            self.telemetry.metrics_addr = Some(parsed);
        }
        Ok(())
    }

    pub fn extension_group_kinds(&self) -> Vec<GroupKind> {
        let Some(em) = &self.extension_manager else { return Vec::new() };
        let mut out: Vec<GroupKind> = Vec::with_capacity(em.resources.len());
        for gvk in &em.resources {
            let gk = GroupKind { group: gvk.group.clone(), kind: gvk.kind.clone() };
            if !out.contains(&gk) {
                out.push(gk);
            }
        }
        out
    }

    /// Translator toggles as of now.
    pub fn flags(&self) -> TranslatorFlags {
        let apis = self.extension_apis.clone().unwrap_or_default();
        TranslatorFlags {
            controller_name: self.gateway.controller_name.clone(),
            namespace: self.namespace.clone(),
            global_rate_limit_enabled: self.rate_limit.is_some(),
            envoy_patch_policy_enabled: apis.enable_envoy_patch_policy,
            backend_enabled: apis.enable_backend,
            extension_group_kinds: self.extension_group_kinds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = ServerConfig::from_yaml("{}").unwrap();
        assert_eq!(cfg, ServerConfig::default());
        assert_eq!(cfg.artifact_cache.tls.ca, PathBuf::from("/certs/ca.crt"));
        let f = cfg.flags();
        assert_eq!(f.controller_name, DEFAULT_CONTROLLER_NAME);
        assert!(!f.global_rate_limit_enabled && !f.backend_enabled);
    }

    #[test]
    fn flags_follow_the_file() {
        let cfg = ServerConfig::from_yaml(
            r#"
namespace: edge
gateway: { controllerName: example.com/gw }
rateLimit: { url: "grpc://ratelimit:8081" }
extensionApis: { enableBackend: true }
extensionManager:
  resources:
    - { group: example.io, version: v1, kind: ListenerPolicy }
    - { group: example.io, version: v2, kind: ListenerPolicy }
"#,
        )
        .unwrap();
        let f = cfg.flags();
        assert_eq!(f.namespace, "edge");
        assert_eq!(f.controller_name, "example.com/gw");
        assert!(f.global_rate_limit_enabled);
        assert!(f.backend_enabled);
        assert!(!f.envoy_patch_policy_enabled);
        assert_eq!(f.extension_group_kinds, vec![GroupKind { group: "example.io".into(), kind: "ListenerPolicy".into() }]);
    }

    #[test]
    fn environment_overrides_telemetry() {
        let mut cfg = ServerConfig::from_yaml("telemetry: { logFilter: debug, metricsAddr: \"127.0.0.1:9000\" }").unwrap();
        assert_eq!(cfg.telemetry.log_filter, "debug");
        assert_eq!(cfg.telemetry.metrics_addr, Some("127.0.0.1:9000".parse().unwrap()));

        cfg.apply_env(|var| match var {
            "GATESYNC_LOG" => Some("gatesync_runner=trace".to_string()),
            "GATESYNC_METRICS_ADDR" => Some("0.0.0.0:9464".to_string()),
            "GATESYNC_NAMESPACE" => Some(String::new()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.telemetry.log_filter, "gatesync_runner=trace");
        assert_eq!(cfg.telemetry.metrics_addr, Some("0.0.0.0:9464".parse().unwrap()));
        assert_eq!(cfg.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn bad_metrics_address_is_rejected() {
        let mut cfg = ServerConfig::default();
        let err = cfg
            .apply_env(|var| (var == "GATESYNC_METRICS_ADDR").then(|| "not-an-addr".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "GATESYNC_METRICS_ADDR", .. }));
        assert_eq!(cfg.telemetry.metrics_addr, None);
    }
}
