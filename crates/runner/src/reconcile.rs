//! One generation of snapshot reconciliation.
//!
//! The snapshot is whole-state, so removals are only visible as absence. Each
//! generation records the keys present before it starts, writes everything
//! the translator produces, then deletes whatever was present before and was
//! not seen again.

use std::sync::Arc;

use gatesync_core::{
    gvk_from_api_version, ControllerResources, NamespacedName, NamespacedNameAndGvk, PolicyStatus, StatusKind,
};
use gatesync_ir::{yaml_string, InfraIr, Validate, XdsIr};
use gatesync_store::{ErrorSink, ProviderResources, StatusStores, Update, Watchable};
use gatesync_translate::{ArtifactResolver, TranslateOptions, Translator, TranslatorFlags};
use kube::core::DynamicObject;
use metrics::counter;
use rustc_hash::FxHashSet;
use tracing::{debug, error, info, warn};

use crate::diff::stale_keys;

/// Status keys seen before a generation and not (yet) seen during it.
pub struct StatusesToDelete {
    by_kind: [FxHashSet<NamespacedName>; StatusKind::COUNT],
    extension_policies: FxHashSet<NamespacedNameAndGvk>,
}

impl StatusesToDelete {
    /// Every key currently held by `statuses`.
    pub fn capture(statuses: &StatusStores) -> Self {
        Self {
            by_kind: std::array::from_fn(|i| statuses.get(StatusKind::ALL[i]).keys().into_iter().collect()),
            extension_policies: statuses.extension_policies.keys().into_iter().collect(),
        }
    }

    /// The resource still exists; its status must survive this generation.
    pub fn keep(&mut self, kind: StatusKind, key: &NamespacedName) {
        self.by_kind[kind.index()].remove(key);
    }

    pub fn keep_extension(&mut self, key: &NamespacedNameAndGvk) {
        self.extension_policies.remove(key);
    }

    pub fn contains(&self, kind: StatusKind, key: &NamespacedName) -> bool {
        self.by_kind[kind.index()].contains(key)
    }

    pub fn len(&self) -> usize {
        self.by_kind.iter().map(|s| s.len()).sum::<usize>() + self.extension_policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every remaining key from `statuses` and clear the sets.
    /// Returns how many records were removed.
    pub fn delete_from(&mut self, statuses: &StatusStores) -> usize {
        let mut deleted = 0;
        for (i, keys) in self.by_kind.iter_mut().enumerate() {
            let store = statuses.get(StatusKind::ALL[i]);
            for key in keys.drain() {
                if store.delete(&key) {
                    deleted += 1;
                }
            }
        }
        for key in self.extension_policies.drain() {
            if statuses.extension_policies.delete(&key) {
                deleted += 1;
            }
        }
        deleted
    }
}

/// Key of a translated extension policy, if it carries enough type
/// information to have one.
pub fn extension_policy_key(obj: &DynamicObject) -> Option<NamespacedNameAndGvk> {
    let types = obj.types.as_ref()?;
    Some(NamespacedNameAndGvk {
        namespaced_name: NamespacedName::from_meta(&obj.metadata),
        gvk: gvk_from_api_version(&types.api_version, &types.kind),
    })
}

/// Typed status carried in the object's `status` field.
///
/// Absent, null or empty status means no opinion this round, as does a
/// status that does not parse (logged).
pub fn policy_status_from_unstructured(obj: &DynamicObject) -> Option<PolicyStatus> {
    let raw = obj.data.get("status")?;
    match raw {
        serde_json::Value::Null => return None,
        serde_json::Value::Object(m) if m.is_empty() => return None,
        _ => {}
    }
    match serde_json::from_value::<PolicyStatus>(raw.clone()) {
        Ok(st) if st.ancestors.is_empty() => None,
        Ok(st) => Some(st),
        Err(e) => {
            warn!(name = ?obj.metadata.name, namespace = ?obj.metadata.namespace, error = %e, "unable to convert unstructured policy status");
            None
        }
    }
}

/// What one generation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    pub bundles: usize,
    pub ir_published: usize,
    pub ir_failed: usize,
    pub ir_deleted: usize,
    pub statuses_written: usize,
    pub statuses_deleted: usize,
}

/// Sole writer of the IR planes and status stores.
pub struct Reconciler {
    name: String,
    provider: Arc<ProviderResources>,
    xds_ir: Arc<Watchable<String, XdsIr>>,
    infra_ir: Arc<Watchable<String, InfraIr>>,
    translator: Arc<dyn Translator>,
}

impl Reconciler {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<ProviderResources>,
        xds_ir: Arc<Watchable<String, XdsIr>>,
        infra_ir: Arc<Watchable<String, InfraIr>>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self { name: name.into(), provider, xds_ir, infra_ir, translator }
    }

    fn ir_keys(&self) -> FxHashSet<String> {
        self.infra_ir.keys().into_iter().chain(self.xds_ir.keys()).collect()
    }

    /// Handle one provider update. A delete, or an update without a value,
    /// tears everything down.
    pub fn on_update(
        &self,
        update: Update<String, ControllerResources>,
        flags: &TranslatorFlags,
        artifacts: Option<Arc<dyn ArtifactResolver>>,
        errors: &ErrorSink,
    ) -> GenerationSummary {
        info!(runner = %self.name, key = %update.key, delete = update.is_delete(), "received an update");
        match update.value {
            Some(snapshot) if !update.delete => self.apply_snapshot(&snapshot, flags, artifacts, errors),
            _ => self.teardown(),
        }
    }

    /// Reconcile every store against `snapshot`.
    ///
    /// Entries that fail validation are reported to `errors` and not
    /// published. They do not count as seen, so a value published for that
    /// key by an earlier generation is deleted from both planes.
    pub fn apply_snapshot(
        &self,
        snapshot: &ControllerResources,
        flags: &TranslatorFlags,
        artifacts: Option<Arc<dyn ArtifactResolver>>,
        errors: &ErrorSink,
    ) -> GenerationSummary {
        let runner = self.name.as_str();
        let mut summary = GenerationSummary { bundles: snapshot.len(), ..Default::default() };

        let cur_keys = self.ir_keys();
        let mut to_delete = StatusesToDelete::capture(&self.provider.statuses);
        let mut new_keys: FxHashSet<String> = FxHashSet::default();

        for bundle in snapshot {
            let opts = TranslateOptions::for_bundle(flags, bundle, artifacts.clone());
            let result = self.translator.translate(bundle, &opts);
            if let Some(msg) = result.error_summary() {
                error!(runner, gateway_class = %opts.gateway_class_name, error = %msg, "errors detected during translation");
            }

            for (key, ir) in result.ir {
                if let Err(e) = ir.validate() {
                    errors.report(anyhow::Error::new(e).context(format!("validate ir {key}")));
                    summary.ir_failed += 1;
                    continue;
                }
                debug!(runner, key = %key, xds = %yaml_string(&ir.xds), infra = %yaml_string(&ir.infra), "publishing ir");
                self.xds_ir.store(key.clone(), ir.xds);
                self.infra_ir.store(key.clone(), ir.infra);
                summary.ir_published += 1;
                new_keys.insert(key);
            }

            for entry in result.statuses {
                to_delete.keep(entry.kind, &entry.key);
                if let Some(mut status) = entry.status {
                    let store = self.provider.statuses.get(entry.kind);
                    if let Some(prev) = store.load(&entry.key) {
                        status.keep_transition_times(&prev);
                    }
                    if store.store(entry.key, status) {
                        summary.statuses_written += 1;
                    }
                }
            }

            for obj in &result.extension_server_policies {
                let Some(key) = extension_policy_key(obj) else {
                    warn!(runner, name = ?obj.metadata.name, "extension policy without type information");
                    continue;
                };
                to_delete.keep_extension(&key);
                if let Some(status) = policy_status_from_unstructured(obj) {
                    if self.provider.statuses.extension_policies.store(key, status) {
                        summary.statuses_written += 1;
                    }
                }
            }
        }

        for key in stale_keys(cur_keys, new_keys) {
            debug!(runner, key = %key, "deleting stale ir");
            self.xds_ir.delete(&key);
            self.infra_ir.delete(&key);
            summary.ir_deleted += 1;
        }
        summary.statuses_deleted = to_delete.delete_from(&self.provider.statuses);

        counter!("gatesync_generations_total", 1, "runner" => runner.to_string());
        counter!("gatesync_ir_keys_deleted_total", summary.ir_deleted as u64, "runner" => runner.to_string());
        counter!("gatesync_status_keys_deleted_total", summary.statuses_deleted as u64, "runner" => runner.to_string());
        debug!(runner, ?summary, "generation reconciled");
        summary
    }

    /// Delete every IR key and every status record.
    pub fn teardown(&self) -> GenerationSummary {
        let runner = self.name.as_str();
        let mut summary = GenerationSummary::default();
        for key in self.ir_keys() {
            self.xds_ir.delete(&key);
            self.infra_ir.delete(&key);
            summary.ir_deleted += 1;
        }
        summary.statuses_deleted = StatusesToDelete::capture(&self.provider.statuses).delete_from(&self.provider.statuses);

        counter!("gatesync_ir_keys_deleted_total", summary.ir_deleted as u64, "runner" => runner.to_string());
        counter!("gatesync_status_keys_deleted_total", summary.statuses_deleted as u64, "runner" => runner.to_string());
        info!(runner, ir = summary.ir_deleted, statuses = summary.statuses_deleted, "torn down all derived state");
        summary
    }
}

