//! The coordinator for one in-flight load.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use tierload_key::Fingerprint;

use super::EngineResource;
use crate::error::{EngineError, LoadError};
use crate::executor::ExecutorTiers;
use crate::load::{DataSource, DecodeJob, PipelineHandle};

/// Receives the outcome of a load.
///
/// Called on the engine actor; implementations must not block.
pub trait ResourceCallback: Send + Sync {
    /// The resource has been acquired on behalf of this callback; hand it back
    /// with `Engine::release` when done.
    fn on_resource_ready(&self, resource: Arc<EngineResource>, data_source: DataSource);

    fn on_load_failed(&self, error: LoadError);
}

/// Outcome forwarded by [`ChannelCallback`].
#[derive(Debug)]
pub enum LoadEvent {
    Ready {
        resource: Arc<EngineResource>,
        data_source: DataSource,
    },
    Failed(LoadError),
}

/// Forwards outcomes to an unbounded channel.
#[derive(Debug)]
pub struct ChannelCallback {
    tx: mpsc::UnboundedSender<LoadEvent>,
}

impl ChannelCallback {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<LoadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ResourceCallback for ChannelCallback {
    fn on_resource_ready(&self, resource: Arc<EngineResource>, data_source: DataSource) {
        let _ = self.tx.send(LoadEvent::Ready {
            resource,
            data_source,
        });
    }

    fn on_load_failed(&self, error: LoadError) {
        let _ = self.tx.send(LoadEvent::Failed(error));
    }
}

/// Identity of one use of a pooled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job_{}", self.0)
    }
}

/// Request flags a job is created with.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct JobFlags {
    pub memory_cacheable: bool,
    pub use_unlimited_source_pool: bool,
    pub use_animation_pool: bool,
    pub only_retrieve_from_cache: bool,
}

/// Engine-side bookkeeping triggered by a job.
pub(crate) trait EngineJobListener {
    /// `resource` is `None` when the job failed.
    fn on_engine_job_complete(&mut self, key: &Fingerprint, resource: Option<&Arc<EngineResource>>);

    fn on_engine_job_cancelled(&mut self, key: &Fingerprint, job_id: JobId);

    /// The resource's last acquisition was released.
    fn on_resource_released(&mut self, resource: Arc<EngineResource>);
}

pub(crate) struct EngineJob {
    id: JobId,
    key: Option<Fingerprint>,
    flags: JobFlags,
    callbacks: Vec<Arc<dyn ResourceCallback>>,
    pipeline: Option<PipelineHandle>,
    started_at: Option<Instant>,
}

impl EngineJob {
    fn empty() -> Self {
        Self {
            id: JobId(0),
            key: None,
            flags: JobFlags::default(),
            callbacks: Vec::new(),
            pipeline: None,
            started_at: None,
        }
    }

    fn init(&mut self, id: JobId, key: Fingerprint, flags: JobFlags) {
        self.id = id;
        self.key = Some(key);
        self.flags = flags;
        self.callbacks.clear();
        self.pipeline = None;
        self.started_at = None;
    }

    fn reset(&mut self) {
        self.key = None;
        self.flags = JobFlags::default();
        self.callbacks.clear();
        self.pipeline = None;
        self.started_at = None;
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn flags(&self) -> JobFlags {
        self.flags
    }

    pub(crate) fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Adds a subscriber. A callback already subscribed is not added twice.
    pub(crate) fn add_callback(&mut self, callback: Arc<dyn ResourceCallback>) {
        if !self.callbacks.iter().any(|cb| Arc::ptr_eq(cb, &callback)) {
            self.callbacks.push(callback);
        }
    }

    /// Removes a subscriber. Returns true if none are left and the job should
    /// be cancelled.
    pub(crate) fn remove_callback(&mut self, callback: &Arc<dyn ResourceCallback>) -> bool {
        self.callbacks.retain(|cb| !Arc::ptr_eq(cb, callback));
        self.callbacks.is_empty()
    }

    /// Submits the pipeline to its tier. Pipelines that read the disk cache
    /// start on the disk cache tier and move to the source tier on a miss.
    pub(crate) fn start(
        &mut self,
        decode_job: DecodeJob,
        pipeline: PipelineHandle,
        tiers: &ExecutorTiers,
    ) -> Result<(), EngineError> {
        let source = tiers.active_source(
            self.flags.use_unlimited_source_pool,
            self.flags.use_animation_pool,
        );
        let (tier, reschedule) = if decode_job.will_decode_from_cache() {
            (&tiers.disk_cache, Some(source.clone()))
        } else {
            (source, None)
        };

        tier.execute(decode_job.run(reschedule))?;
        self.pipeline = Some(pipeline);
        self.started_at = Some(Instant::now());
        debug!(job_id = %self.id, tier = tier.name(), "Job started");
        Ok(())
    }

    /// Cancels the pipeline. No outcome is delivered to anyone.
    pub(crate) fn cancel(&mut self, listener: &mut dyn EngineJobListener) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.cancel();
        }
        if let Some(key) = &self.key {
            listener.on_engine_job_cancelled(key, self.id);
        }
    }

    fn elapsed_ms(&self) -> u128 {
        self.started_at.map_or(0, |t| t.elapsed().as_millis())
    }

    /// Delivers a fresh resource to every subscriber exactly once.
    ///
    /// The job holds its own acquisition while delivering so the resource
    /// cannot reach zero (and be cached or recycled) half way through.
    pub(crate) fn notify_ready(
        &mut self,
        resource: Arc<EngineResource>,
        data_source: DataSource,
        listener: &mut dyn EngineJobListener,
    ) {
        let Some(key) = self.key.clone() else {
            return;
        };
        self.pipeline = None;

        if let Err(e) = resource.acquire() {
            warn!(key = %key, error = %e, "Job result cannot be acquired");
            return;
        }
        listener.on_engine_job_complete(&key, Some(&resource));

        debug!(
            key = %key,
            job_id = %self.id,
            subscribers = self.callbacks.len(),
            elapsed_ms = self.elapsed_ms() as u64,
            ?data_source,
            "Job complete"
        );
        for callback in self.callbacks.drain(..) {
            if resource.acquire().is_ok() {
                callback.on_resource_ready(resource.clone(), data_source);
            }
        }

        match resource.release() {
            Ok(true) => listener.on_resource_released(resource),
            Ok(false) => {}
            Err(e) => warn!(key = %key, error = %e, "Job hold was already released"),
        }
    }

    /// Delivers the same failure to every subscriber exactly once. A pipeline
    /// still running is told to stop, without a cancellation notice.
    pub(crate) fn notify_failed(&mut self, error: LoadError, listener: &mut dyn EngineJobListener) {
        let Some(key) = self.key.clone() else {
            return;
        };
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.cancel();
        }
        listener.on_engine_job_complete(&key, None);

        debug!(
            key = %key,
            job_id = %self.id,
            subscribers = self.callbacks.len(),
            elapsed_ms = self.elapsed_ms() as u64,
            error = %error,
            "Job failed"
        );
        for callback in self.callbacks.drain(..) {
            callback.on_load_failed(error.clone());
        }
    }
}

/// Freelist of jobs.
pub(crate) struct JobPool {
    free: Vec<EngineJob>,
    capacity: usize,
    next_id: u64,
}

impl JobPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            capacity,
            next_id: 0,
        }
    }

    /// Hands out a job initialised for `key` with a fresh id.
    pub(crate) fn acquire(&mut self, key: Fingerprint, flags: JobFlags) -> EngineJob {
        let mut job = self.free.pop().unwrap_or_else(EngineJob::empty);
        self.next_id += 1;
        job.init(JobId(self.next_id), key, flags);
        job
    }

    pub(crate) fn release(&mut self, mut job: EngineJob) {
        job.reset();
        if self.free.len() < self.capacity {
            self.free.push(job);
        }
    }

    pub(crate) fn free_count(&self) -> usize {
        self.free.len()
    }
}
