//! The engine: request deduplication across the active set, memory cache,
//! disk cache and origin.
//!
//! ## Load order
//!
//! 1. **Active resources**: a resource someone currently holds
//! 2. **Memory cache**: a released resource nobody holds
//! 3. **Running job**: join the in-flight load for the same fingerprint
//! 4. **New job**: disk cache, then origin, on the executor tiers
//!
//! All of this bookkeeping runs on the engine actor. [`Engine`] is a cheap
//! front for its mailbox.

mod active;
mod actor;
mod job;
mod jobs;
mod recycler;
mod request;
mod resource;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub(crate) use actor::EngineMessage;
pub use job::{ChannelCallback, JobId, LoadEvent, ResourceCallback};
pub use recycler::ResourceRecycler;
pub use request::{EngineStats, EngineStatsSnapshot, LoadRequest, LoadStatus, Loaded};
pub use resource::{EngineResource, Payload, Resource};

use active::ActiveResources;
use actor::EngineActor;
use job::JobPool;
use jobs::Jobs;

use crate::actors::{self, ActorHandle, ActorRef};
use crate::cache::{
    DiskCache, DiskCacheFactory, FileDiskCacheFactory, LazyDiskCacheProvider, LruResourceCache,
    MemoryCache,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, LoadError};
use crate::executor::ExecutorTiers;
use crate::load::Registry;

static ENGINE_IDS: AtomicU64 = AtomicU64::new(1);

/// Configures and starts an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    memory_cache: Option<Box<dyn MemoryCache>>,
    disk_cache_factory: Option<Box<dyn DiskCacheFactory>>,
    registry: Option<Registry>,
}

impl EngineBuilder {
    /// Replaces the default [`LruResourceCache`].
    #[must_use]
    pub fn memory_cache(mut self, cache: Box<dyn MemoryCache>) -> Self {
        self.memory_cache = Some(cache);
        self
    }

    #[must_use]
    pub fn disk_cache_factory(mut self, factory: Box<dyn DiskCacheFactory>) -> Self {
        self.disk_cache_factory = Some(factory);
        self
    }

    /// Replaces the default file, HTTP and bytes loaders.
    #[must_use]
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Spawns the engine actor. Must be called inside a tokio runtime.
    pub fn build(self) -> Engine {
        let config = self.config;
        let id = ENGINE_IDS.fetch_add(1, Ordering::Relaxed);

        let recycler = Arc::new(ResourceRecycler::new());
        let mut cache: Box<dyn MemoryCache> = match self.memory_cache {
            Some(cache) => cache,
            None => Box::new(LruResourceCache::new(config.memory_cache_bytes)),
        };
        cache.set_resource_removed_listener(recycler.clone());

        let factory: Box<dyn DiskCacheFactory> =
            match (self.disk_cache_factory, &config.disk_cache_dir) {
                (Some(factory), _) => factory,
                (None, Some(dir)) => Box::new(FileDiskCacheFactory::new(dir.clone())),
                (None, None) => Box::new(|| None::<Arc<dyn DiskCache>>),
            };
        let disk_cache = Arc::new(LazyDiskCacheProvider::new(factory));

        let registry = Arc::new(self.registry.unwrap_or_else(|| {
            Registry::builder()
                .with_defaults(reqwest::Client::new())
                .build()
        }));

        let tiers = Arc::new(ExecutorTiers::from_config(&config));
        let stats = Arc::new(EngineStats::default());

        let (mailbox, inbox) = actors::mailbox("engine", config.mailbox_size.max(1));
        let engine_actor = EngineActor {
            engine_id: id,
            mailbox: mailbox.clone(),
            active: ActiveResources::new(config.retain_active_resources),
            cache,
            jobs: Jobs::default(),
            pool: JobPool::new(config.job_pool_capacity),
            recycler,
            registry,
            disk_cache: disk_cache.clone(),
            tiers: tiers.clone(),
            stats: stats.clone(),
        };
        let actor = actors::spawn(engine_actor, inbox);
        let sweeper = spawn_sweeper(mailbox.clone(), config.sweep_interval);

        info!(
            engine_id = id,
            memory_cache_bytes = config.memory_cache_bytes,
            source_concurrency = config.source_concurrency,
            disk_cache_dir = ?config.disk_cache_dir,
            "Engine built"
        );

        Engine {
            id,
            mailbox,
            actor,
            sweeper,
            tiers,
            disk_cache,
            stats,
            config,
        }
    }
}

fn spawn_sweeper(mailbox: ActorHandle<EngineMessage>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if mailbox.send(EngineMessage::SweepActive).await.is_err() {
                break;
            }
        }
    })
}

/// Handle to a running engine.
pub struct Engine {
    id: u64,
    mailbox: ActorHandle<EngineMessage>,
    actor: ActorRef,
    sweeper: JoinHandle<()>,
    tiers: Arc<ExecutorTiers>,
    disk_cache: Arc<LazyDiskCacheProvider>,
    stats: Arc<EngineStats>,
    config: EngineConfig,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            memory_cache: None,
            disk_cache_factory: None,
            registry: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Starts or joins a load.
    ///
    /// Active and memory cache hits are delivered to `callback` before this
    /// returns and yield `None`. Otherwise the callback is subscribed to a job
    /// and the returned status can unsubscribe it.
    pub async fn load(
        &self,
        request: LoadRequest,
        callback: Arc<dyn ResourceCallback>,
    ) -> Result<Option<LoadStatus>, EngineError> {
        let key = request.fingerprint()?;
        let (reply_to, reply) = oneshot::channel();
        self.mailbox
            .send(EngineMessage::Load {
                key,
                request,
                callback,
                reply_to,
            })
            .await?;
        reply.await.map_err(|_| EngineError::EngineStopped)
    }

    /// Loads and waits for the outcome.
    pub async fn get(&self, request: LoadRequest) -> Result<Loaded, EngineError> {
        let (callback, mut events) = ChannelCallback::new();
        let _status = self.load(request, callback).await?;

        match events.recv().await {
            Some(LoadEvent::Ready {
                resource,
                data_source,
            }) => Ok(Loaded {
                resource,
                data_source,
            }),
            Some(LoadEvent::Failed(e)) => Err(e.into()),
            None => Err(LoadError::EngineStopped.into()),
        }
    }

    /// Gives back one acquisition of a resource this engine delivered.
    pub async fn release(&self, resource: Arc<EngineResource>) -> Result<(), EngineError> {
        let (reply_to, reply) = oneshot::channel();
        self.mailbox
            .send(EngineMessage::Release { resource, reply_to })
            .await?;
        reply
            .await
            .map_err(|_| EngineError::EngineStopped)?
            .map_err(EngineError::from)
    }

    /// Evicts everything from the memory cache. Active resources are kept.
    pub async fn clear_memory(&self) -> Result<(), EngineError> {
        let (reply_to, reply) = oneshot::channel();
        self.mailbox
            .send(EngineMessage::ClearMemory { reply_to })
            .await?;
        reply.await.map_err(|_| EngineError::EngineStopped)
    }

    /// Deletes every entry of the disk cache, creating it first if needed.
    pub async fn clear_disk_cache(&self) -> Result<(), EngineError> {
        let provider = self.disk_cache.clone();
        tokio::task::spawn_blocking(move || provider.get_disk_cache().clear())
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))??;
        Ok(())
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stops the engine. Pending jobs are cancelled and their subscribers are
    /// told the engine stopped; running tasks get the configured grace period.
    /// The disk cache is left intact.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        let grace = self.config.shutdown_grace;
        self.sweeper.abort();

        if !self.actor.stop_and_wait(grace).await {
            warn!(engine_id = self.id, "Engine actor did not stop in time");
        }

        let result = self.tiers.shutdown(grace).await;
        info!(engine_id = self.id, ok = result.is_ok(), "Engine shut down");
        result
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.sweeper.abort();
        self.actor.stop();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("actor_id", &self.actor.actor_id)
            .finish()
    }
}
