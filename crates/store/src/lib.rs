//! gatesync store: watchable key-value maps shared between the reconciler and
//! its readers, plus the sequential subscription dispatcher.

#![forbid(unsafe_code)]

use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::trace;

pub mod resources;
pub mod subscription;

pub use resources::{ProviderResources, StatusStore, StatusStores};
pub use subscription::{handle_subscription, ErrorSink, Metadata};

/// A single change observed by a subscriber.
///
/// `value == None` is a deletion even when `delete` is false.
#[derive(Debug)]
pub struct Update<K, V> {
    pub key: K,
    pub value: Option<Arc<V>>,
    pub delete: bool,
}

impl<K: Clone, V> Clone for Update<K, V> {
    fn clone(&self) -> Self {
        Self { key: self.key.clone(), value: self.value.clone(), delete: self.delete }
    }
}

impl<K, V> Update<K, V> {
    pub fn is_delete(&self) -> bool {
        self.delete || self.value.is_none()
    }
}

struct Inner<K, V> {
    map: FxHashMap<K, Arc<V>>,
    subscribers: Vec<mpsc::UnboundedSender<Update<K, V>>>,
    closed: bool,
}

/// Concurrent map with change subscriptions.
///
/// Values are handed out as `Arc<V>`, so a reader holds either the value
/// before or after a write, never a partial one. Writes and their
/// notifications happen under one lock, so subscribers see changes in write
/// order.
pub struct Watchable<K, V> {
    inner: RwLock<Inner<K, V>>,
}

impl<K, V> Default for Watchable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Watchable<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner { map: FxHashMap::default(), subscribers: Vec::new(), closed: false }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<K, V>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<K, V>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().map.is_empty()
    }

    /// End every subscription. Later writes still apply but notify nobody.
    pub fn close(&self) {
        let mut g = self.write();
        g.closed = true;
        g.subscribers.clear();
    }
}

impl<K, V> Watchable<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn load(&self, key: &K) -> Option<Arc<V>> {
        self.read().map.get(key).cloned()
    }

    /// Point-in-time copy of every entry.
    pub fn load_all(&self) -> Vec<(K, Arc<V>)> {
        self.read().map.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
    }

    pub fn keys(&self) -> Vec<K> {
        self.read().map.keys().cloned().collect()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.read().map.contains_key(key)
    }

    /// Remove `key`. Returns false when it was not present.
    pub fn delete(&self, key: &K) -> bool {
        let mut g = self.write();
        if g.map.remove(key).is_none() {
            return false;
        }
        publish(&mut g, Update { key: key.clone(), value: None, delete: true });
        true
    }

    /// Subscribe to changes. The current contents are replayed first.
    pub fn subscribe(&self) -> Subscription<K, V> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut g = self.write();
        if g.closed {
            drop(tx);
            return Subscription { rx };
        }
        for (k, v) in g.map.iter() {
            let _ = tx.send(Update { key: k.clone(), value: Some(Arc::clone(v)), delete: false });
        }
        g.subscribers.push(tx);
        Subscription { rx }
    }
}

impl<K, V> Watchable<K, V>
where
    K: Clone + Eq + Hash,
    V: PartialEq,
{
    /// Insert or replace `key`. An equal value is not re-published; returns
    /// whether the stored value changed.
    pub fn store(&self, key: K, value: impl Into<Arc<V>>) -> bool {
        let value = value.into();
        let mut g = self.write();
        if let Some(cur) = g.map.get(&key) {
            if **cur == *value {
                return false;
            }
        }
        g.map.insert(key.clone(), Arc::clone(&value));
        publish(&mut g, Update { key, value: Some(value), delete: false });
        true
    }
}

fn publish<K: Clone, V>(g: &mut Inner<K, V>, update: Update<K, V>) {
    g.subscribers.retain(|tx| tx.send(update.clone()).is_ok());
    trace!(subscribers = g.subscribers.len(), "published update");
}

/// Receiving half of [`Watchable::subscribe`].
pub struct Subscription<K, V> {
    rx: mpsc::UnboundedReceiver<Update<K, V>>,
}

impl<K, V> Subscription<K, V> {
    /// Next update; `None` once the store is closed or dropped.
    pub async fn recv(&mut self) -> Option<Update<K, V>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Update<K, V>> {
        self.rx.try_recv().ok()
    }
}
