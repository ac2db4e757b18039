//! gatesync translate: the translator seam between a resource bundle and the
//! artifacts the reconciler publishes.
//!
//! A [`Translator`] is stateless. It receives one bundle plus per-bundle
//! [`TranslateOptions`] and returns a [`TranslationResult`] holding the IR
//! entries keyed by gateway identity, a status opinion for every
//! status-bearing resource it saw, and any non-fatal errors.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use gatesync_core::{NamespacedName, ResourceStatus, Resources, StatusKind};
use gatesync_ir::GatewayIr;
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};

pub mod gateway;

pub use gateway::GatewayTranslator;

/// Group and kind of an extension-provided resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

/// Process-wide toggles, resolved once per generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslatorFlags {
    pub controller_name: String,
    pub namespace: String,
    pub global_rate_limit_enabled: bool,
    pub envoy_patch_policy_enabled: bool,
    pub backend_enabled: bool,
    pub extension_group_kinds: Vec<GroupKind>,
}

/// Capability for resolving external artifact references (wasm modules) to
/// local cache paths.
pub trait ArtifactResolver: Send + Sync {
    /// Local path for `url`, or `None` when the artifact is not available.
    fn resolve(&self, url: &str) -> Option<String>;
}

/// Inputs for translating one bundle.
#[derive(Clone)]
pub struct TranslateOptions<'a> {
    pub flags: &'a TranslatorFlags,
    pub gateway_class_name: String,
    pub merge_gateways: bool,
    pub artifacts: Option<Arc<dyn ArtifactResolver>>,
}

impl<'a> TranslateOptions<'a> {
    /// Options for `bundle`: class name and merge toggle are read from it.
    pub fn for_bundle(
        flags: &'a TranslatorFlags,
        bundle: &Resources,
        artifacts: Option<Arc<dyn ArtifactResolver>>,
    ) -> Self {
        Self {
            flags,
            gateway_class_name: bundle.gateway_class_name(),
            merge_gateways: bundle.merge_gateways_enabled(),
            artifacts,
        }
    }
}

/// Status opinion for one resource seen during translation.
///
/// `status: None` means the resource still exists but the translator has no
/// status to report this round.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEntry {
    pub kind: StatusKind,
    pub key: NamespacedName,
    pub status: Option<ResourceStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    #[error("route {route}: backend {backend} has no port")]
    MissingBackendPort { route: String, backend: String },
    #[error("route {route}: backend {backend} not found")]
    UnknownBackend { route: String, backend: String },
    #[error("policy {policy}: wasm module {url} could not be resolved")]
    UnresolvedArtifact { policy: String, url: String },
    #[error("route {route}: listener {listener} already has a route")]
    ListenerConflict { route: String, listener: String },
}

#[derive(Debug, Clone, Default)]
pub struct TranslationResult {
    /// IR entries keyed by gateway identity.
    pub ir: BTreeMap<String, GatewayIr>,
    pub statuses: Vec<StatusEntry>,
    /// Extension policies as translated; a non-empty `status` field carries
    /// the status to report.
    pub extension_server_policies: Vec<DynamicObject>,
    pub errors: Vec<TranslationError>,
}

impl TranslationResult {
    pub fn push_status(&mut self, kind: StatusKind, key: NamespacedName, status: Option<ResourceStatus>) {
        self.statuses.push(StatusEntry { kind, key, status });
    }

    /// Errors folded into one message, if any occurred.
    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(self.errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))
    }
}

/// Maps one resource bundle to IR entries and status opinions. Never mutates
/// shared state.
pub trait Translator: Send + Sync {
    fn translate(&self, resources: &Resources, opts: &TranslateOptions<'_>) -> TranslationResult;
}
