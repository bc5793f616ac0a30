//! The engine actor.
//!
//! Owns the active tracker, memory cache, job registry and job pool. Every
//! load, release, job completion and reclaim is a message, so the
//! lookup-then-mutate steps of a load never interleave with another's.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use tierload_key::Fingerprint;

use super::active::{ActiveResources, Reclaimed};
use super::job::{EngineJobListener, JobFlags, JobId, JobPool, ResourceCallback};
use super::jobs::Jobs;
use super::recycler::ResourceRecycler;
use super::{EngineResource, EngineStats, LoadRequest, LoadStatus, Payload};
use crate::actors::{Actor, ActorContext, ActorHandle};
use crate::cache::{LazyDiskCacheProvider, MemoryCache};
use crate::error::{LoadError, ResourceError};
use crate::executor::ExecutorTiers;
use crate::load::{DataSource, DecodeHelper, DecodeJob, JobSink, Registry};

/// Messages handled by the engine actor.
pub(crate) enum EngineMessage {
    Load {
        key: Fingerprint,
        request: LoadRequest,
        callback: Arc<dyn ResourceCallback>,
        reply_to: oneshot::Sender<Option<LoadStatus>>,
    },
    Release {
        resource: Arc<EngineResource>,
        reply_to: oneshot::Sender<Result<(), ResourceError>>,
    },
    RemoveCallback {
        key: Fingerprint,
        job_id: JobId,
        only_cache: bool,
        callback: Arc<dyn ResourceCallback>,
    },
    JobReady {
        key: Fingerprint,
        job_id: JobId,
        only_cache: bool,
        payload: Payload,
        data_source: DataSource,
    },
    JobFailed {
        key: Fingerprint,
        job_id: JobId,
        only_cache: bool,
        error: LoadError,
    },
    /// A resource was dropped while still acquired.
    Reclaimed {
        key: Fingerprint,
        resource_id: u64,
    },
    /// Periodic scan of the active set for dropped resources.
    SweepActive,
    ClearMemory {
        reply_to: oneshot::Sender<()>,
    },
}

impl fmt::Debug for EngineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMessage::Load { key, .. } => f.debug_struct("Load").field("key", key).finish(),
            EngineMessage::Release { resource, .. } => f
                .debug_struct("Release")
                .field("resource_id", &resource.id())
                .finish(),
            EngineMessage::RemoveCallback { key, job_id, .. } => f
                .debug_struct("RemoveCallback")
                .field("key", key)
                .field("job_id", job_id)
                .finish(),
            EngineMessage::JobReady {
                key,
                job_id,
                data_source,
                ..
            } => f
                .debug_struct("JobReady")
                .field("key", key)
                .field("job_id", job_id)
                .field("data_source", data_source)
                .finish(),
            EngineMessage::JobFailed { key, job_id, error, .. } => f
                .debug_struct("JobFailed")
                .field("key", key)
                .field("job_id", job_id)
                .field("error", error)
                .finish(),
            EngineMessage::Reclaimed { key, resource_id } => f
                .debug_struct("Reclaimed")
                .field("key", key)
                .field("resource_id", resource_id)
                .finish(),
            EngineMessage::SweepActive => f.write_str("SweepActive"),
            EngineMessage::ClearMemory { .. } => f.write_str("ClearMemory"),
        }
    }
}

pub(crate) struct EngineActor {
    pub(crate) engine_id: u64,
    pub(crate) mailbox: ActorHandle<EngineMessage>,
    pub(crate) active: ActiveResources,
    pub(crate) cache: Box<dyn MemoryCache>,
    pub(crate) jobs: Jobs,
    pub(crate) pool: JobPool,
    pub(crate) recycler: Arc<ResourceRecycler>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) disk_cache: Arc<LazyDiskCacheProvider>,
    pub(crate) tiers: Arc<ExecutorTiers>,
    pub(crate) stats: Arc<EngineStats>,
}

impl EngineActor {
    fn load(
        &mut self,
        key: Fingerprint,
        request: LoadRequest,
        callback: Arc<dyn ResourceCallback>,
    ) -> Option<LoadStatus> {
        let started = Instant::now();

        if request.is_memory_cacheable() {
            if let Some(reclaimed) = self.active.reclaim(&key, None) {
                self.on_reclaimed(&key, reclaimed);
            }

            if let Some(resource) = self.active.get(&key) {
                EngineStats::incr(&self.stats.active_hits);
                debug!(
                    key = %key,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Loaded resource from active resources"
                );
                callback.on_resource_ready(resource, DataSource::MemoryCache);
                return None;
            }

            if let Some(resource) = self.load_from_cache(&key) {
                EngineStats::incr(&self.stats.memory_hits);
                debug!(
                    key = %key,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Loaded resource from cache"
                );
                callback.on_resource_ready(resource, DataSource::MemoryCache);
                return None;
            }
        }

        let only_cache = request.is_only_retrieve_from_cache();
        if let Some(job) = self.jobs.get_mut(&key, only_cache) {
            job.add_callback(callback.clone());
            EngineStats::incr(&self.stats.jobs_joined);
            debug!(
                key = %key,
                job_id = %job.id(),
                subscribers = job.callback_count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Added to existing load"
            );
            return Some(LoadStatus::new(
                self.mailbox.clone(),
                key,
                job.id(),
                only_cache,
                callback,
            ));
        }

        let flags = JobFlags {
            memory_cacheable: request.is_memory_cacheable(),
            use_unlimited_source_pool: request.uses_unlimited_source_pool(),
            use_animation_pool: request.uses_animation_pool(),
            only_retrieve_from_cache: only_cache,
        };
        let mut job = self.pool.acquire(key.clone(), flags);
        let job_id = job.id();

        let helper = Arc::new(DecodeHelper::new(
            request,
            self.registry.clone(),
            self.disk_cache.clone(),
        ));
        let sink = JobSink::new(self.mailbox.clone(), key.clone(), job_id, only_cache);
        let (decode_job, pipeline) = DecodeJob::new(helper, sink);

        job.add_callback(callback.clone());
        if let Err(e) = job.start(decode_job, pipeline, &self.tiers) {
            warn!(key = %key, error = %e, "Failed to start job");
            self.pool.release(job);
            callback.on_load_failed(LoadError::EngineStopped);
            return None;
        }
        self.jobs.put(key.clone(), job);
        EngineStats::incr(&self.stats.jobs_started);

        debug!(
            key = %key,
            job_id = %job_id,
            jobs_in_flight = self.jobs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Started new load"
        );
        Some(LoadStatus::new(
            self.mailbox.clone(),
            key,
            job_id,
            only_cache,
            callback,
        ))
    }

    /// Moves a cached resource back into the active set.
    fn load_from_cache(&mut self, key: &Fingerprint) -> Option<Arc<EngineResource>> {
        let resource = self.cache.remove(key)?;
        if let Err(e) = resource.acquire() {
            warn!(key = %key, error = %e, "Cached resource was already recycled");
            return None;
        }
        self.active.activate(key.clone(), &resource);
        Some(resource)
    }

    fn release(&mut self, resource: Arc<EngineResource>) -> Result<(), ResourceError> {
        if resource.engine_id() != self.engine_id {
            return Err(ResourceError::ForeignEngine);
        }
        if resource.key().is_none() {
            return Err(ResourceError::Untracked);
        }
        if resource.release()? {
            self.on_resource_released(resource);
        }
        Ok(())
    }

    fn remove_callback(
        &mut self,
        key: Fingerprint,
        job_id: JobId,
        only_cache: bool,
        callback: Arc<dyn ResourceCallback>,
    ) {
        let should_cancel = match self.jobs.get_mut(&key, only_cache) {
            Some(job) if job.id() == job_id => job.remove_callback(&callback),
            _ => {
                debug!(key = %key, job_id = %job_id, "Cancel for a job that already finished");
                return;
            }
        };
        if !should_cancel {
            return;
        }
        if let Some(mut job) = self.jobs.remove_if_current(&key, only_cache, job_id) {
            job.cancel(self);
            self.pool.release(job);
        }
    }

    fn on_job_ready(
        &mut self,
        key: Fingerprint,
        job_id: JobId,
        only_cache: bool,
        payload: Payload,
        data_source: DataSource,
    ) {
        let Some(mut job) = self.jobs.remove_if_current(&key, only_cache, job_id) else {
            debug!(key = %key, job_id = %job_id, "Discarding result of cancelled job");
            payload.recycle();
            return;
        };

        let resource = Arc::new(EngineResource::new(
            payload,
            self.engine_id,
            job.flags().memory_cacheable,
            true,
        ));
        resource.set_resource_listener(key, self.mailbox.clone());

        job.notify_ready(resource, data_source, self);
        self.pool.release(job);
    }

    fn on_job_failed(&mut self, key: Fingerprint, job_id: JobId, only_cache: bool, error: LoadError) {
        let Some(mut job) = self.jobs.remove_if_current(&key, only_cache, job_id) else {
            debug!(key = %key, job_id = %job_id, "Ignoring failure of cancelled job");
            return;
        };
        job.notify_failed(error, self);
        self.pool.release(job);
    }

    /// Handles a resource that was dropped without being released. A retained
    /// payload goes to the memory cache under a new wrapper.
    fn on_reclaimed(&mut self, key: &Fingerprint, reclaimed: Reclaimed) {
        EngineStats::incr(&self.stats.reclaimed);
        warn!(
            key = %key,
            resource_id = reclaimed.resource_id,
            "Resource dropped without release"
        );

        if let Some(payload) = reclaimed.retained {
            let resource = Arc::new(EngineResource::new(payload, self.engine_id, true, false));
            resource.set_resource_listener(key.clone(), self.mailbox.clone());
            self.on_resource_released(resource);
        }
    }

    fn sweep_active(&mut self) {
        for (key, resource_id) in self.active.dead_entries() {
            if let Some(reclaimed) = self.active.reclaim(&key, Some(resource_id)) {
                self.on_reclaimed(&key, reclaimed);
            }
        }
    }
}

impl EngineJobListener for EngineActor {
    fn on_engine_job_complete(&mut self, key: &Fingerprint, resource: Option<&Arc<EngineResource>>) {
        match resource {
            Some(resource) => {
                EngineStats::incr(&self.stats.jobs_completed);
                if resource.is_cacheable() {
                    self.active.activate(key.clone(), resource);
                }
            }
            None => EngineStats::incr(&self.stats.jobs_failed),
        }
    }

    fn on_engine_job_cancelled(&mut self, key: &Fingerprint, job_id: JobId) {
        EngineStats::incr(&self.stats.jobs_cancelled);
        debug!(key = %key, job_id = %job_id, "Job cancelled");
    }

    fn on_resource_released(&mut self, resource: Arc<EngineResource>) {
        let Some(key) = resource.key().cloned() else {
            self.recycler.recycle(resource);
            return;
        };
        self.active.deactivate(&key, resource.id());

        if resource.is_cacheable() {
            self.cache.put(key, resource);
        } else {
            self.recycler.recycle(resource);
        }
    }
}

#[async_trait]
impl Actor for EngineActor {
    type Message = EngineMessage;

    fn name(&self) -> &str {
        "engine"
    }

    async fn handle(&mut self, msg: EngineMessage, _ctx: &mut ActorContext) -> bool {
        match msg {
            EngineMessage::Load {
                key,
                request,
                callback,
                reply_to,
            } => {
                let status = self.load(key, request, callback);
                let _ = reply_to.send(status);
            }
            EngineMessage::Release { resource, reply_to } => {
                let result = self.release(resource);
                if let Err(e) = &result {
                    warn!(error = %e, "Rejected resource release");
                }
                let _ = reply_to.send(result);
            }
            EngineMessage::RemoveCallback {
                key,
                job_id,
                only_cache,
                callback,
            } => self.remove_callback(key, job_id, only_cache, callback),
            EngineMessage::JobReady {
                key,
                job_id,
                only_cache,
                payload,
                data_source,
            } => self.on_job_ready(key, job_id, only_cache, payload, data_source),
            EngineMessage::JobFailed {
                key,
                job_id,
                only_cache,
                error,
            } => self.on_job_failed(key, job_id, only_cache, error),
            EngineMessage::Reclaimed { key, resource_id } => {
                if let Some(reclaimed) = self.active.reclaim(&key, Some(resource_id)) {
                    self.on_reclaimed(&key, reclaimed);
                }
            }
            EngineMessage::SweepActive => self.sweep_active(),
            EngineMessage::ClearMemory { reply_to } => {
                self.cache.clear_memory();
                let _ = reply_to.send(());
            }
        }
        true
    }

    async fn on_start(&mut self, ctx: &mut ActorContext) {
        info!(
            actor_id = %ctx.actor_id,
            engine_id = self.engine_id,
            max_memory_cache = self.cache.max_size(),
            "Engine started"
        );
    }

    async fn on_stop(&mut self, ctx: &mut ActorContext) {
        let pending = self.jobs.drain();
        for mut job in pending {
            job.notify_failed(LoadError::EngineStopped, self);
            self.pool.release(job);
        }

        info!(
            actor_id = %ctx.actor_id,
            active = self.active.len(),
            cached = self.cache.len(),
            cached_bytes = self.cache.current_size(),
            pooled_jobs = self.pool.free_count(),
            messages = ctx.messages_processed,
            "Engine stopped"
        );
    }
}
