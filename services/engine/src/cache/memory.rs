//! Bounded in-memory cache of released resources.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use tierload_key::Fingerprint;

use crate::engine::EngineResource;

/// Notified when the cache drops a resource on its own (eviction, trim,
/// replacement). Not called for [`MemoryCache::remove`].
pub trait ResourceRemovedListener: Send + Sync {
    fn on_resource_removed(&self, resource: Arc<EngineResource>);
}

/// A bounded cache of resources nobody currently holds.
pub trait MemoryCache: Send {
    /// Removes and returns the entry without notifying the listener.
    fn remove(&mut self, key: &Fingerprint) -> Option<Arc<EngineResource>>;

    fn put(&mut self, key: Fingerprint, resource: Arc<EngineResource>);

    fn set_resource_removed_listener(&mut self, listener: Arc<dyn ResourceRemovedListener>);

    /// Sum of the byte sizes of all entries.
    fn current_size(&self) -> usize;

    fn max_size(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts every entry.
    fn clear_memory(&mut self) {
        self.trim_to_size(0);
    }

    /// Evicts least recently used entries until the cache fits in `size`.
    fn trim_to_size(&mut self, size: usize);
}

struct Entry {
    tick: u64,
    size: usize,
    resource: Arc<EngineResource>,
}

/// Least-recently-used cache bounded by resource byte size.
pub struct LruResourceCache {
    max_size: usize,
    current_size: usize,
    tick: u64,
    entries: HashMap<Fingerprint, Entry>,
    order: BTreeMap<u64, Fingerprint>,
    listener: Option<Arc<dyn ResourceRemovedListener>>,
}

impl LruResourceCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            current_size: 0,
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            listener: None,
        }
    }

    fn evicted(&self, resource: Arc<EngineResource>) {
        if let Some(listener) = &self.listener {
            listener.on_resource_removed(resource);
        }
    }

    fn take(&mut self, key: &Fingerprint) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        self.current_size -= entry.size;
        Some(entry)
    }
}

impl MemoryCache for LruResourceCache {
    fn remove(&mut self, key: &Fingerprint) -> Option<Arc<EngineResource>> {
        self.take(key).map(|entry| entry.resource)
    }

    fn put(&mut self, key: Fingerprint, resource: Arc<EngineResource>) {
        let size = resource.size_bytes();
        if size >= self.max_size {
            debug!(key = %key, size, max_size = self.max_size, "Resource larger than cache");
            self.evicted(resource);
            return;
        }

        if let Some(old) = self.take(&key) {
            if !Arc::ptr_eq(&old.resource, &resource) {
                self.evicted(old.resource);
            }
        }

        self.tick += 1;
        self.order.insert(self.tick, key.clone());
        self.entries.insert(
            key,
            Entry {
                tick: self.tick,
                size,
                resource,
            },
        );
        self.current_size += size;

        self.trim_to_size(self.max_size);
    }

    fn set_resource_removed_listener(&mut self, listener: Arc<dyn ResourceRemovedListener>) {
        self.listener = Some(listener);
    }

    fn current_size(&self) -> usize {
        self.current_size
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn trim_to_size(&mut self, size: usize) {
        while self.current_size > size {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.current_size -= entry.size;
                self.evicted(entry.resource);
            }
        }
    }
}
