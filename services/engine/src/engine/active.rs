//! Resources currently held by at least one consumer.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tierload_key::Fingerprint;

use super::{EngineResource, Payload};

struct ResourceWeakRef {
    resource_id: u64,
    resource: Weak<EngineResource>,
    /// Kept only when retention is allowed and the resource is cacheable.
    retained: Option<Payload>,
}

/// A dead entry removed from the tracker.
#[derive(Debug)]
pub(crate) struct Reclaimed {
    pub resource_id: u64,
    pub retained: Option<Payload>,
}

/// Weakly tracks resources handed out to consumers.
///
/// Entries never keep a resource alive. When a consumer drops a resource
/// without releasing it, the resource's drop hook (or the periodic sweep)
/// asks the engine to [`reclaim`](ActiveResources::reclaim) the entry.
pub(crate) struct ActiveResources {
    entries: HashMap<Fingerprint, ResourceWeakRef>,
    retention_allowed: bool,
}

impl ActiveResources {
    pub(crate) fn new(retention_allowed: bool) -> Self {
        Self {
            entries: HashMap::new(),
            retention_allowed,
        }
    }

    pub(crate) fn activate(&mut self, key: Fingerprint, resource: &Arc<EngineResource>) {
        let retained = (self.retention_allowed && resource.is_cacheable())
            .then(|| resource.payload().clone());
        self.entries.insert(
            key,
            ResourceWeakRef {
                resource_id: resource.id(),
                resource: Arc::downgrade(resource),
                retained,
            },
        );
    }

    /// Removes the entry if it still refers to `resource_id`.
    pub(crate) fn deactivate(&mut self, key: &Fingerprint, resource_id: u64) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.resource_id == resource_id => {
                self.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Returns the live resource for `key`, already acquired for the caller.
    pub(crate) fn get(&self, key: &Fingerprint) -> Option<Arc<EngineResource>> {
        let resource = self.entries.get(key)?.resource.upgrade()?;
        resource.acquire().ok()?;
        Some(resource)
    }

    /// Removes the entry for `key` if its resource has been dropped. With
    /// `resource_id`, only an entry for that resource is considered.
    pub(crate) fn reclaim(&mut self, key: &Fingerprint, resource_id: Option<u64>) -> Option<Reclaimed> {
        let entry = self.entries.get(key)?;
        if resource_id.is_some_and(|id| id != entry.resource_id) {
            return None;
        }
        if entry.resource.strong_count() > 0 {
            return None;
        }

        let entry = self.entries.remove(key)?;
        Some(Reclaimed {
            resource_id: entry.resource_id,
            retained: entry.retained,
        })
    }

    /// Entries whose resources have been dropped.
    pub(crate) fn dead_entries(&self) -> Vec<(Fingerprint, u64)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.resource.strong_count() == 0)
            .map(|(key, entry)| (key.clone(), entry.resource_id))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
