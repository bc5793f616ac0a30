//! Load requests, cancellation handles and engine counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use tierload_key::{
    Fingerprint, KeyError, Model, OptionValue, Options, ResourceType, Signature, SIZE_ORIGINAL,
};

use super::job::{JobId, ResourceCallback};
use super::{EngineMessage, EngineResource, Resource};
use crate::actors::ActorHandle;
use crate::error::EngineError;
use crate::load::{DataSource, DiskCacheStrategy, Priority, Transformation, Transformations};

/// Everything a caller can say about one load.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    model: Model,
    signature: Signature,
    width: i32,
    height: i32,
    resource_type: ResourceType,
    transcode_type: ResourceType,
    priority: Priority,
    disk_cache_strategy: DiskCacheStrategy,
    transformations: Transformations,
    transformation_required: bool,
    scale_only: bool,
    options: Options,
    memory_cacheable: bool,
    use_unlimited_source_pool: bool,
    use_animation_pool: bool,
    only_retrieve_from_cache: bool,
}

impl LoadRequest {
    /// A request decoding `model` into `resource_type` at its original size.
    pub fn new(model: Model, resource_type: ResourceType) -> Self {
        Self {
            model,
            signature: Signature::empty(),
            width: SIZE_ORIGINAL,
            height: SIZE_ORIGINAL,
            resource_type,
            transcode_type: resource_type,
            priority: Priority::default(),
            disk_cache_strategy: DiskCacheStrategy::default(),
            transformations: Transformations::new(),
            transformation_required: false,
            scale_only: false,
            options: Options::new(),
            memory_cacheable: true,
            use_unlimited_source_pool: false,
            use_animation_pool: false,
            only_retrieve_from_cache: false,
        }
    }

    /// Shorthand for a request decoding into `T`.
    pub fn of<T: Resource>(model: Model) -> Self {
        Self::new(model, ResourceType::of::<T>())
    }

    #[must_use]
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    #[must_use]
    pub fn size(mut self, width: i32, height: i32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn transcode_to(mut self, transcode_type: ResourceType) -> Self {
        self.transcode_type = transcode_type;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_disk_cache_strategy(mut self, strategy: DiskCacheStrategy) -> Self {
        self.disk_cache_strategy = strategy;
        self
    }

    #[must_use]
    pub fn transformation(
        mut self,
        resource_type: ResourceType,
        transformation: Arc<dyn Transformation>,
    ) -> Self {
        self.transformations.insert(resource_type, transformation);
        self
    }

    #[must_use]
    pub fn transformation_required(mut self, required: bool) -> Self {
        self.transformation_required = required;
        self
    }

    #[must_use]
    pub fn scale_only(mut self, scale_only: bool) -> Self {
        self.scale_only = scale_only;
        self
    }

    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.set(key, value);
        self
    }

    #[must_use]
    pub fn memory_cacheable(mut self, cacheable: bool) -> Self {
        self.memory_cacheable = cacheable;
        self
    }

    #[must_use]
    pub fn use_unlimited_source_pool(mut self, unlimited: bool) -> Self {
        self.use_unlimited_source_pool = unlimited;
        self
    }

    #[must_use]
    pub fn use_animation_pool(mut self, animation: bool) -> Self {
        self.use_animation_pool = animation;
        self
    }

    #[must_use]
    pub fn only_retrieve_from_cache(mut self, only_cache: bool) -> Self {
        self.only_retrieve_from_cache = only_cache;
        self
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn transcode_type(&self) -> ResourceType {
        self.transcode_type
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn disk_cache_strategy(&self) -> DiskCacheStrategy {
        self.disk_cache_strategy
    }

    pub fn transformations(&self) -> &Transformations {
        &self.transformations
    }

    pub fn is_transformation_required(&self) -> bool {
        self.transformation_required
    }

    pub fn is_scale_only(&self) -> bool {
        self.scale_only
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn is_memory_cacheable(&self) -> bool {
        self.memory_cacheable
    }

    pub fn is_only_retrieve_from_cache(&self) -> bool {
        self.only_retrieve_from_cache
    }

    pub(crate) fn uses_unlimited_source_pool(&self) -> bool {
        self.use_unlimited_source_pool
    }

    pub(crate) fn uses_animation_pool(&self) -> bool {
        self.use_animation_pool
    }

    /// The in-memory identity of this request.
    pub fn fingerprint(&self) -> Result<Fingerprint, KeyError> {
        Fingerprint::builder(self.model.clone())
            .signature(self.signature.clone())
            .size(self.width, self.height)
            .transformations(self.transformations.keys())
            .resource_type(self.resource_type)
            .transcode_type(self.transcode_type)
            .options(self.options.clone())
            .build()
    }
}

/// Handle for a load that is waiting on a job.
pub struct LoadStatus {
    mailbox: ActorHandle<EngineMessage>,
    key: Fingerprint,
    job_id: JobId,
    only_cache: bool,
    callback: Arc<dyn ResourceCallback>,
}

impl LoadStatus {
    pub(crate) fn new(
        mailbox: ActorHandle<EngineMessage>,
        key: Fingerprint,
        job_id: JobId,
        only_cache: bool,
        callback: Arc<dyn ResourceCallback>,
    ) -> Self {
        Self {
            mailbox,
            key,
            job_id,
            only_cache,
            callback,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Unsubscribes this caller. If it was the job's last subscriber the job
    /// is cancelled. The callback receives nothing afterwards.
    pub async fn cancel(self) -> Result<(), EngineError> {
        self.mailbox
            .send(EngineMessage::RemoveCallback {
                key: self.key,
                job_id: self.job_id,
                only_cache: self.only_cache,
                callback: self.callback,
            })
            .await?;
        Ok(())
    }
}

impl fmt::Debug for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadStatus")
            .field("key", &self.key)
            .field("job_id", &self.job_id)
            .field("only_cache", &self.only_cache)
            .finish()
    }
}

/// A resource returned by `Engine::get`.
#[derive(Debug)]
pub struct Loaded {
    pub resource: Arc<EngineResource>,
    pub data_source: DataSource,
}

impl Loaded {
    pub fn get<T: Resource>(&self) -> Option<&T> {
        self.resource.get()
    }
}

/// Counters describing how loads were served.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub(crate) active_hits: AtomicU64,
    pub(crate) memory_hits: AtomicU64,
    pub(crate) jobs_started: AtomicU64,
    pub(crate) jobs_joined: AtomicU64,
    pub(crate) jobs_cancelled: AtomicU64,
    pub(crate) jobs_completed: AtomicU64,
    pub(crate) jobs_failed: AtomicU64,
    pub(crate) reclaimed: AtomicU64,
}

impl EngineStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            active_hits: self.active_hits.load(Ordering::Relaxed),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            jobs_joined: self.jobs_joined.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatsSnapshot {
    pub active_hits: u64,
    pub memory_hits: u64,
    pub jobs_started: u64,
    pub jobs_joined: u64,
    pub jobs_cancelled: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub reclaimed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::loaders::EncodedBytes;

    #[test]
    fn test_identical_requests_share_fingerprint() {
        let a = LoadRequest::of::<EncodedBytes>(Model::url("https://example.com/a"))
            .size(100, 50)
            .option("quality", 80i64);
        let b = LoadRequest::of::<EncodedBytes>(Model::url("https://example.com/a"))
            .size(100, 50)
            .option("quality", 80i64)
            .with_priority(Priority::High);

        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_size_changes_fingerprint() {
        let a = LoadRequest::of::<EncodedBytes>(Model::url("https://example.com/a")).size(100, 50);
        let b = LoadRequest::of::<EncodedBytes>(Model::url("https://example.com/a")).size(50, 100);

        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_signature_and_transcode_target_change_fingerprint() {
        let base = LoadRequest::of::<EncodedBytes>(Model::named("a"));
        let signed = base
            .clone()
            .with_signature(Signature::new("v2").unwrap());
        let transcoded = base.clone().transcode_to(ResourceType::of::<String>());

        assert_ne!(base.fingerprint().unwrap(), signed.fingerprint().unwrap());
        assert_ne!(base.fingerprint().unwrap(), transcoded.fingerprint().unwrap());
        assert_eq!(transcoded.resource_type(), ResourceType::of::<EncodedBytes>());
    }

    #[test]
    fn test_invalid_size_is_rejected() {
        let request = LoadRequest::of::<EncodedBytes>(Model::named("a")).size(0, 10);
        assert!(request.fingerprint().is_err());
    }
}
