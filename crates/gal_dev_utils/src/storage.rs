use parking_lot::RwLock;
use slotmap::{Key, SlotMap};
use std::sync::Arc;

/// Thread-safe slot storage for device objects.
pub struct ObjectStorage<H: Key, T> {
    inner: RwLock<SlotMap<H, Arc<T>>>,
}

impl<H: Key, T> Default for ObjectStorage<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Key, T> ObjectStorage<H, T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SlotMap::with_key()),
        }
    }

    pub fn insert(&self, object: T) -> H {
        self.inner.write().insert(Arc::new(object))
    }

    /// Removes the object. Stale or null handles yield `None`.
    pub fn remove(&self, handle: H) -> Option<Arc<T>> {
        self.inner.write().remove(handle)
    }

    pub fn get(&self, handle: H) -> Option<Arc<T>> {
        self.inner.read().get(handle).cloned()
    }

    pub fn contains(&self, handle: H) -> bool {
        self.inner.read().contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Snapshot of every live handle.
    pub fn handles(&self) -> Vec<H> {
        self.inner.read().keys().collect()
    }
}
