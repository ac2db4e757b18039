//! Store sets owned by the provider side: the upstream snapshot and the
//! per-kind status records derived from it.

use gatesync_core::{
    ControllerResources, NamespacedName, NamespacedNameAndGvk, PolicyStatus, ResourceStatus, StatusKind,
};

use crate::Watchable;

pub type StatusStore = Watchable<NamespacedName, ResourceStatus>;

/// One status store per [`StatusKind`], plus the GVK-keyed store for
/// extension-provided policies.
pub struct StatusStores {
    by_kind: [StatusStore; StatusKind::COUNT],
    pub extension_policies: Watchable<NamespacedNameAndGvk, PolicyStatus>,
}

impl Default for StatusStores {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStores {
    pub fn new() -> Self {
        Self {
            by_kind: std::array::from_fn(|_| Watchable::new()),
            extension_policies: Watchable::new(),
        }
    }

    pub fn get(&self, kind: StatusKind) -> &StatusStore {
        &self.by_kind[kind.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatusKind, &StatusStore)> {
        StatusKind::ALL.into_iter().map(move |k| (k, self.get(k)))
    }

    /// Number of records across every status store.
    pub fn total_len(&self) -> usize {
        self.by_kind.iter().map(Watchable::len).sum::<usize>() + self.extension_policies.len()
    }

    pub fn close(&self) {
        for s in &self.by_kind {
            s.close();
        }
        self.extension_policies.close();
    }
}

/// Provider-facing resources: the snapshot feed (keyed by controller name)
/// and the status stores written back by the reconciler.
#[derive(Default)]
pub struct ProviderResources {
    pub gateway_api_resources: Watchable<String, ControllerResources>,
    pub statuses: StatusStores,
}

impl ProviderResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.gateway_api_resources.close();
        self.statuses.close();
    }
}
