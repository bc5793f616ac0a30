//! Decoded payloads and the reference-counted wrapper handed to consumers.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use tierload_key::{Fingerprint, ResourceType};

use super::EngineMessage;
use crate::actors::ActorHandle;
use crate::error::ResourceError;

/// A decoded value the engine can cache and recycle.
pub trait Resource: Send + Sync + 'static {
    /// Size used to bound the memory cache.
    fn size_bytes(&self) -> usize;

    /// Frees underlying storage. Called at most once, after the last consumer
    /// has released the resource.
    fn recycle(&self) {}
}

/// A type-erased [`Resource`].
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
    resource: Arc<dyn Resource>,
    resource_type: ResourceType,
}

impl Payload {
    pub fn new<T: Resource>(value: T) -> Self {
        let value = Arc::new(value);
        Self {
            value: value.clone(),
            resource: value,
            resource_type: ResourceType::of::<T>(),
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn size_bytes(&self) -> usize {
        self.resource.size_bytes()
    }

    pub fn downcast_ref<T: Resource>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub fn downcast<T: Resource>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast().ok()
    }

    pub fn recycle(&self) {
        self.resource.recycle();
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("resource_type", &self.resource_type)
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

static RESOURCE_IDS: AtomicU64 = AtomicU64::new(1);

/// Posts a reclaim message if the resource is dropped while still acquired.
struct ReclaimHook {
    key: Fingerprint,
    mailbox: ActorHandle<EngineMessage>,
}

/// A decoded payload plus its acquisition count.
///
/// Every consumer that receives an `Arc<EngineResource>` from the engine holds
/// one acquisition and must give it back with `Engine::release`. Dropping the
/// last `Arc` without releasing is tolerated: the engine is told and cleans up
/// as if the resource had been released.
pub struct EngineResource {
    id: u64,
    engine_id: u64,
    payload: Payload,
    cacheable: bool,
    recyclable: bool,
    acquired: AtomicUsize,
    recycled: AtomicBool,
    hook: OnceLock<ReclaimHook>,
}

impl EngineResource {
    pub(crate) fn new(payload: Payload, engine_id: u64, cacheable: bool, recyclable: bool) -> Self {
        Self {
            id: RESOURCE_IDS.fetch_add(1, Ordering::Relaxed),
            engine_id,
            payload,
            cacheable,
            recyclable,
            acquired: AtomicUsize::new(0),
            recycled: AtomicBool::new(false),
            hook: OnceLock::new(),
        }
    }

    /// Unique per process.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn get<T: Resource>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }

    pub fn resource_type(&self) -> ResourceType {
        self.payload.resource_type()
    }

    pub fn size_bytes(&self) -> usize {
        self.payload.size_bytes()
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn is_recyclable(&self) -> bool {
        self.recyclable
    }

    pub fn is_recycled(&self) -> bool {
        self.recycled.load(Ordering::Acquire)
    }

    /// Current number of acquisitions.
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::Acquire)
    }

    /// The fingerprint this resource was loaded for.
    pub fn key(&self) -> Option<&Fingerprint> {
        self.hook.get().map(|hook| &hook.key)
    }

    pub(crate) fn engine_id(&self) -> u64 {
        self.engine_id
    }

    pub(crate) fn set_resource_listener(&self, key: Fingerprint, mailbox: ActorHandle<EngineMessage>) {
        let _ = self.hook.set(ReclaimHook { key, mailbox });
    }

    pub(crate) fn acquire(&self) -> Result<(), ResourceError> {
        if self.is_recycled() {
            return Err(ResourceError::AcquireRecycled);
        }
        self.acquired.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Gives back one acquisition. Returns true if this was the last one.
    pub(crate) fn release(&self) -> Result<bool, ResourceError> {
        self.acquired
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|previous| previous == 1)
            .map_err(|_| ResourceError::NotAcquired)
    }

    pub(crate) fn recycle(&self) -> Result<(), ResourceError> {
        if self.acquired() > 0 {
            return Err(ResourceError::RecycleAcquired);
        }
        if self.recycled.swap(true, Ordering::AcqRel) {
            return Err(ResourceError::AlreadyRecycled);
        }
        if self.recyclable {
            self.payload.recycle();
        }
        Ok(())
    }
}

impl Drop for EngineResource {
    fn drop(&mut self) {
        if *self.acquired.get_mut() == 0 {
            return;
        }
        if let Some(hook) = self.hook.get() {
            let msg = EngineMessage::Reclaimed {
                key: hook.key.clone(),
                resource_id: self.id,
            };
            if hook.mailbox.try_send(msg).is_err() {
                debug!(resource_id = self.id, "Could not post reclaim, leaving it to the sweep");
            }
        }
    }
}

impl fmt::Debug for EngineResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineResource")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .field("cacheable", &self.cacheable)
            .field("recyclable", &self.recyclable)
            .field("acquired", &self.acquired())
            .field("recycled", &self.is_recycled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counted(Arc<AtomicUsize>);

    impl Resource for Counted {
        fn size_bytes(&self) -> usize {
            8
        }

        fn recycle(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn resource(recyclable: bool) -> (EngineResource, Arc<AtomicUsize>) {
        let recycled = Arc::new(AtomicUsize::new(0));
        let resource =
            EngineResource::new(Payload::new(Counted(recycled.clone())), 1, true, recyclable);
        (resource, recycled)
    }

    #[test]
    fn test_release_reports_last_acquisition() {
        let (resource, _) = resource(true);
        resource.acquire().unwrap();
        resource.acquire().unwrap();

        assert_eq!(resource.release(), Ok(false));
        assert_eq!(resource.release(), Ok(true));
        assert_eq!(resource.acquired(), 0);
    }

    #[test]
    fn test_release_at_zero_is_an_error() {
        let (resource, _) = resource(true);
        assert_eq!(resource.release(), Err(ResourceError::NotAcquired));

        resource.acquire().unwrap();
        resource.release().unwrap();
        assert_eq!(resource.release(), Err(ResourceError::NotAcquired));
    }

    #[test]
    fn test_recycle_contract() {
        let (resource, recycled) = resource(true);
        resource.acquire().unwrap();
        assert_eq!(resource.recycle(), Err(ResourceError::RecycleAcquired));

        resource.release().unwrap();
        resource.recycle().unwrap();
        assert_eq!(recycled.load(Ordering::SeqCst), 1);

        assert_eq!(resource.recycle(), Err(ResourceError::AlreadyRecycled));
        assert_eq!(resource.acquire(), Err(ResourceError::AcquireRecycled));
        assert_eq!(recycled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_non_recyclable_payload_is_left_alone() {
        let (resource, recycled) = resource(false);
        resource.recycle().unwrap();
        assert!(resource.is_recycled());
        assert_eq!(recycled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_payload_downcast() {
        let (resource, _) = resource(true);
        assert!(resource.get::<Counted>().is_some());
        assert!(resource.payload().downcast::<Counted>().is_some());
        assert!(resource.resource_type().is::<Counted>());
    }
}
