//! Final disposal of resources nobody holds or caches.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use super::EngineResource;
use crate::cache::ResourceRemovedListener;

/// Recycles resources that left every tier.
///
/// Recycling a payload can release nested resources, which would re-enter the
/// recycler. Those are queued and drained by the outermost call instead of
/// recursing.
#[derive(Default)]
pub struct ResourceRecycler {
    queue: Mutex<VecDeque<Arc<EngineResource>>>,
    recycling: AtomicBool,
}

impl ResourceRecycler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recycle(&self, resource: Arc<EngineResource>) {
        self.lock().push_back(resource);

        loop {
            if self.recycling.swap(true, Ordering::AcqRel) {
                return;
            }
            while let Some(next) = self.next() {
                if let Err(e) = next.recycle() {
                    warn!(resource_id = next.id(), error = %e, "Failed to recycle resource");
                }
            }
            self.recycling.store(false, Ordering::Release);

            if self.lock().is_empty() {
                return;
            }
        }
    }

    fn next(&self) -> Option<Arc<EngineResource>> {
        self.lock().pop_front()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Arc<EngineResource>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResourceRemovedListener for ResourceRecycler {
    fn on_resource_removed(&self, resource: Arc<EngineResource>) {
        self.recycle(resource);
    }
}
