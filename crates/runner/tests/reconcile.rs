#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gatesync_core::resources::GatewayClass;
use gatesync_core::status::{condition, BackendStatus, CONDITION_ACCEPTED};
use gatesync_core::{ControllerResources, NamespacedName, ResourceStatus, Resources, StatusKind};
use gatesync_ir::{GatewayIr, InfraIr, ProxyInfra, XdsIr};
use gatesync_runner::reconcile::extension_policy_key;
use gatesync_runner::{GenerationSummary, Reconciler};
use gatesync_store::{ErrorSink, Metadata, ProviderResources, Update, Watchable};
use gatesync_translate::{
    GatewayTranslator, TranslateOptions, TranslationResult, Translator, TranslatorFlags,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use tokio::sync::mpsc;

/// Returns a canned result per gateway class; editable between generations.
#[derive(Default)]
struct Scripted(Mutex<HashMap<String, TranslationResult>>);

impl Scripted {
    fn set(&self, class: &str, result: TranslationResult) {
        self.0.lock().unwrap().insert(class.to_string(), result);
    }
}

impl Translator for Scripted {
    fn translate(&self, _resources: &Resources, opts: &TranslateOptions<'_>) -> TranslationResult {
        self.0.lock().unwrap().get(&opts.gateway_class_name).cloned().unwrap_or_default()
    }
}

struct Harness {
    provider: Arc<ProviderResources>,
    xds: Arc<Watchable<String, XdsIr>>,
    infra: Arc<Watchable<String, InfraIr>>,
    reconciler: Reconciler,
    sink: ErrorSink,
    errors: mpsc::Receiver<anyhow::Error>,
}

impl Harness {
    fn new(translator: Arc<dyn Translator>) -> Self {
        let provider = Arc::new(ProviderResources::new());
        let xds = Arc::new(Watchable::new());
        let infra = Arc::new(Watchable::new());
        let reconciler =
            Reconciler::new("test", Arc::clone(&provider), Arc::clone(&xds), Arc::clone(&infra), translator);
        let (sink, errors) = ErrorSink::channel(Metadata::new("test", "provider-resources"), 16);
        Self { provider, xds, infra, reconciler, sink, errors }
    }

    fn apply(&self, bundles: Vec<Resources>) -> GenerationSummary {
        self.reconciler.apply_snapshot(&ControllerResources(bundles), &TranslatorFlags::default(), None, &self.sink)
    }

    fn ir_keys(&self) -> (Vec<String>, Vec<String>) {
        let mut x = self.xds.keys();
        let mut i = self.infra.keys();
        x.sort();
        i.sort();
        (x, i)
    }

    fn status(&self, kind: StatusKind, name: &str) -> Option<Arc<ResourceStatus>> {
        self.provider.statuses.get(kind).load(&NamespacedName::new("default", name))
    }

    fn drain_errors(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(e) = self.errors.try_recv() {
            out.push(format!("{e:#}"));
        }
        out
    }
}

fn bundle(class: &str) -> Resources {
    Resources {
        gateway_class: Some(GatewayClass {
            metadata: ObjectMeta { name: Some(class.to_string()), ..Default::default() },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn valid_ir(name: &str) -> GatewayIr {
    GatewayIr {
        infra: InfraIr { proxy: ProxyInfra { name: name.to_string(), gateway_class: "eg".into(), ..Default::default() } },
        xds: XdsIr::default(),
    }
}

fn invalid_ir() -> GatewayIr {
    GatewayIr::default()
}

fn accepted(ok: bool) -> ResourceStatus {
    ResourceStatus::Backend(BackendStatus { conditions: vec![condition(CONDITION_ACCEPTED, ok, "Test", "", None)] })
}

fn result(ir: &[(&str, GatewayIr)], statuses: &[(&str, Option<ResourceStatus>)]) -> TranslationResult {
    let mut r = TranslationResult::default();
    for (k, v) in ir {
        r.ir.insert(k.to_string(), v.clone());
    }
    for (name, st) in statuses {
        r.push_status(StatusKind::Backend, NamespacedName::new("default", *name), st.clone());
    }
    r
}

const GATEWAY_BUNDLE: &str = r#"
- gatewayClass:
    metadata: { name: eg }
  gateways:
    - metadata: { name: gw1, namespace: default }
      spec:
        gatewayClassName: eg
        listeners:
          - { name: http, port: 80, protocol: HTTP }
  httpRoutes:
    - metadata: { name: web, namespace: default }
      spec:
        parentRefs: [ { name: gw1 } ]
        rules:
          - backendRefs: [ { name: web, port: 8080 } ]
"#;

fn gateway_snapshot() -> Vec<Resources> {
    let snap: ControllerResources = serde_yaml::from_str(GATEWAY_BUNDLE).unwrap();
    snap.0
}

#[test]
fn constant_snapshot_is_idempotent() {
    let h = Harness::new(Arc::new(GatewayTranslator));
    let first = h.apply(gateway_snapshot());
    let keys = h.ir_keys();
    let second = h.apply(gateway_snapshot());

    assert_eq!(first.ir_published, 1);
    assert!(first.statuses_written > 0);
    assert_eq!(second.statuses_written, 0);
    assert_eq!(h.ir_keys(), keys);
    assert_eq!(second.ir_deleted, 0);
    assert_eq!(second.statuses_deleted, 0);
}

#[test]
fn gateway_lifecycle_scenario() {
    let h = Harness::new(Arc::new(GatewayTranslator));

    h.apply(gateway_snapshot());
    assert_eq!(h.ir_keys(), (vec!["default/gw1".to_string()], vec!["default/gw1".to_string()]));
    assert!(h.status(StatusKind::Gateway, "gw1").is_some());
    assert!(h.status(StatusKind::HttpRoute, "web").is_some());

    let summary = h.apply(Vec::new());
    assert_eq!(summary.ir_deleted, 1);
    assert!(h.xds.is_empty() && h.infra.is_empty());
    assert_eq!(h.provider.statuses.total_len(), 0);

    h.apply(gateway_snapshot());
    h.reconciler.teardown();
    assert!(h.xds.is_empty() && h.infra.is_empty());
    assert_eq!(h.provider.statuses.total_len(), 0);
}

#[test]
fn teardown_empties_every_store() {
    let scripted = Arc::new(Scripted::default());
    let h = Harness::new(scripted.clone());
    scripted.set("a", result(&[("a", valid_ir("a"))], &[("r1", Some(accepted(true)))]));
    h.apply(vec![bundle("a")]);
    h.provider.statuses.get(StatusKind::Gateway).store(NamespacedName::new("default", "gw"), accepted(true));
    h.xds.store("orphan".to_string(), XdsIr::default());

    let summary = h.reconciler.teardown();
    assert_eq!(summary.ir_deleted, 2);
    assert_eq!(summary.statuses_deleted, 2);
    assert!(h.xds.is_empty() && h.infra.is_empty());
    assert_eq!(h.provider.statuses.total_len(), 0);
}

#[test]
fn empty_status_keeps_the_previous_record() {
    let scripted = Arc::new(Scripted::default());
    let h = Harness::new(scripted.clone());

    scripted.set("a", result(&[], &[("r1", Some(accepted(true)))]));
    h.apply(vec![bundle("a")]);
    let before = h.status(StatusKind::Backend, "r1").unwrap();

    scripted.set("a", result(&[], &[("r1", None)]));
    let summary = h.apply(vec![bundle("a")]);
    assert_eq!(summary.statuses_deleted, 0);
    let after = h.status(StatusKind::Backend, "r1").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
}

#[test]
fn status_of_a_vanished_resource_is_deleted() {
    let scripted = Arc::new(Scripted::default());
    let h = Harness::new(scripted.clone());

    scripted.set("a", result(&[], &[("r1", Some(accepted(true))), ("r2", Some(accepted(false)))]));
    h.apply(vec![bundle("a")]);

    scripted.set("a", result(&[], &[("r2", None)]));
    let summary = h.apply(vec![bundle("a")]);
    assert_eq!(summary.statuses_deleted, 1);
    assert!(h.status(StatusKind::Backend, "r1").is_none());
    assert!(h.status(StatusKind::Backend, "r2").is_some());
}

#[test]
fn resource_moving_between_bundles_keeps_its_status() {
    let scripted = Arc::new(Scripted::default());
    let h = Harness::new(scripted.clone());

    scripted.set("a", result(&[], &[("r1", Some(accepted(true)))]));
    h.apply(vec![bundle("a"), bundle("b")]);

    scripted.set("a", result(&[], &[]));
    scripted.set("b", result(&[], &[("r1", None)]));
    h.apply(vec![bundle("a"), bundle("b")]);
    assert!(h.status(StatusKind::Backend, "r1").is_some());
}

#[test]
fn one_invalid_entry_does_not_block_the_others() {
    let scripted = Arc::new(Scripted::default());
    let mut h = Harness::new(scripted.clone());
    scripted.set("b1", result(&[("b1", valid_ir("b1"))], &[]));
    scripted.set("b2", result(&[("b2-ok", valid_ir("b2-ok")), ("b2-bad", invalid_ir())], &[]));
    scripted.set("b3", result(&[("b3", valid_ir("b3"))], &[]));

    let summary = h.apply(vec![bundle("b1"), bundle("b2"), bundle("b3")]);
    assert_eq!(summary.ir_published, 3);
    assert_eq!(summary.ir_failed, 1);
    let (xds, infra) = h.ir_keys();
    assert_eq!(xds, vec!["b1", "b2-ok", "b3"]);
    assert_eq!(infra, xds);

    let errors = h.drain_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("validate ir b2-bad"), "{}", errors[0]);
}

#[test]
fn failed_entry_removes_the_previous_value_from_both_planes() {
    let scripted = Arc::new(Scripted::default());
    let mut h = Harness::new(scripted.clone());

    scripted.set("a", result(&[("k", valid_ir("k")), ("other", valid_ir("other"))], &[]));
    h.apply(vec![bundle("a")]);
    assert!(h.infra.contains_key(&"k".to_string()));

    scripted.set("a", result(&[("k", invalid_ir()), ("other", valid_ir("other"))], &[]));
    let summary = h.apply(vec![bundle("a")]);
    assert_eq!(summary.ir_failed, 1);
    assert_eq!(summary.ir_deleted, 1);
    assert!(!h.infra.contains_key(&"k".to_string()));
    assert!(!h.xds.contains_key(&"k".to_string()));
    assert_eq!(h.ir_keys(), (vec!["other".to_string()], vec!["other".to_string()]));
    assert_eq!(h.drain_errors().len(), 1);

    scripted.set("a", result(&[("k", valid_ir("k")), ("other", valid_ir("other"))], &[]));
    h.apply(vec![bundle("a")]);
    assert!(h.infra.contains_key(&"k".to_string()) && h.xds.contains_key(&"k".to_string()));
}

#[test]
fn update_without_a_value_tears_down() {
    let scripted = Arc::new(Scripted::default());
    let h = Harness::new(scripted.clone());
    scripted.set("a", result(&[("a", valid_ir("a"))], &[("r1", Some(accepted(true)))]));
    let update = Update {
        key: "eg".to_string(),
        value: Some(Arc::new(ControllerResources(vec![bundle("a")]))),
        delete: false,
    };
    let summary = h.reconciler.on_update(update, &TranslatorFlags::default(), None, &h.sink);
    assert_eq!(summary.ir_published, 1);
    assert!(h.status(StatusKind::Backend, "r1").is_some());

    let update = Update { key: "eg".to_string(), value: None, delete: false };
    let summary = h.reconciler.on_update(update, &TranslatorFlags::default(), None, &h.sink);
    assert_eq!(summary.ir_deleted, 1);
    assert_eq!(summary.statuses_deleted, 1);
    assert!(h.xds.is_empty() && h.infra.is_empty());
    assert_eq!(h.provider.statuses.total_len(), 0);
}

#[test]
fn delete_update_tears_down_even_with_a_value() {
    let scripted = Arc::new(Scripted::default());
    let h = Harness::new(scripted.clone());
    scripted.set("a", result(&[("a", valid_ir("a"))], &[]));
    h.apply(vec![bundle("a")]);

    let update = Update {
        key: "eg".to_string(),
        value: Some(Arc::new(ControllerResources(vec![bundle("a")]))),
        delete: true,
    };
    h.reconciler.on_update(update, &TranslatorFlags::default(), None, &h.sink);
    assert!(h.xds.is_empty() && h.infra.is_empty());
}

#[test]
fn stale_key_in_one_plane_is_removed_from_both() {
    let scripted = Arc::new(Scripted::default());
    let h = Harness::new(scripted.clone());
    h.xds.store("half".to_string(), XdsIr::default());
    scripted.set("a", result(&[("a", valid_ir("a"))], &[]));

    let summary = h.apply(vec![bundle("a")]);
    assert_eq!(summary.ir_deleted, 1);
    assert_eq!(h.ir_keys(), (vec!["a".to_string()], vec!["a".to_string()]));
}

fn extension_policy(with_status: bool) -> DynamicObject {
    let mut v = serde_json::json!({
        "apiVersion": "example.io/v1",
        "kind": "ListenerPolicy",
        "metadata": { "name": "lp", "namespace": "default" },
        "spec": { "targetRef": { "kind": "Gateway", "name": "gw1" } },
    });
    if with_status {
        v["status"] = serde_json::json!({
            "ancestors": [ { "ancestorRef": { "name": "gw1" }, "controllerName": "gatesync.io/gatewayclass-controller" } ]
        });
    }
    serde_json::from_value(v).unwrap()
}

#[test]
fn extension_policy_status_follows_the_same_rules() {
    let scripted = Arc::new(Scripted::default());
    let h = Harness::new(scripted.clone());
    let key = extension_policy_key(&extension_policy(false)).unwrap();
    assert_eq!(key.gvk.group, "example.io");

    let mut r = TranslationResult::default();
    r.extension_server_policies.push(extension_policy(true));
    scripted.set("a", r);
    h.apply(vec![bundle("a")]);
    let stored = h.provider.statuses.extension_policies.load(&key).unwrap();
    assert_eq!(stored.ancestors[0].ancestor_ref.name, "gw1");

    let mut r = TranslationResult::default();
    r.extension_server_policies.push(extension_policy(false));
    scripted.set("a", r);
    h.apply(vec![bundle("a")]);
    assert!(h.provider.statuses.extension_policies.contains_key(&key));

    scripted.set("a", TranslationResult::default());
    let summary = h.apply(vec![bundle("a")]);
    assert_eq!(summary.statuses_deleted, 1);
    assert!(h.provider.statuses.extension_policies.is_empty());
}
