//! Executor tiers for decode pipelines.
//!
//! Each tier is a task-submission surface over the tokio runtime with an
//! optional concurrency limit. Tiers track their tasks so shutdown can drain
//! them with a grace period and abort whatever is left.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;

/// A named pool of tokio tasks.
#[derive(Debug)]
pub struct ExecutorTier {
    name: &'static str,
    permits: Option<Arc<Semaphore>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    accepting: AtomicBool,
}

impl ExecutorTier {
    /// Creates a tier. `limit` bounds how many tasks run at once; `None` means
    /// unbounded.
    pub fn new(name: &'static str, limit: Option<usize>) -> Self {
        Self {
            name,
            permits: limit.map(|n| Arc::new(Semaphore::new(n.max(1)))),
            tasks: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Submits a task. Fails once the tier has been shut down.
    pub fn execute<F>(&self, task: F) -> Result<(), EngineError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(EngineError::Rejected { tier: self.name });
        }

        let permits = self.permits.clone();
        let handle = tokio::spawn(async move {
            let _permit = match permits {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };
            task.await;
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
        Ok(())
    }

    /// Number of submitted tasks that have not finished.
    pub fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| !t.is_finished())
            .count()
    }

    fn abort_all(&self) {
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            task.abort();
        }
    }

    async fn wait_idle(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            if self.active_count() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stops accepting work and waits up to `grace` for running tasks. Tasks
    /// still running are then aborted and given another `grace` to unwind.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), EngineError> {
        self.accepting.store(false, Ordering::SeqCst);
        if let Some(semaphore) = &self.permits {
            semaphore.close();
        }

        if self.wait_idle(grace).await {
            return Ok(());
        }

        warn!(tier = self.name, remaining = self.active_count(), "Force aborting tier tasks");
        self.abort_all();

        if self.wait_idle(grace).await {
            Ok(())
        } else {
            Err(EngineError::ShutdownTimeout { tier: self.name })
        }
    }
}

/// The four tiers a job can run on.
#[derive(Debug)]
pub struct ExecutorTiers {
    pub disk_cache: Arc<ExecutorTier>,
    pub source: Arc<ExecutorTier>,
    pub source_unlimited: Arc<ExecutorTier>,
    pub animation: Arc<ExecutorTier>,
}

impl ExecutorTiers {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            disk_cache: Arc::new(ExecutorTier::new(
                "disk_cache",
                Some(config.disk_cache_concurrency),
            )),
            source: Arc::new(ExecutorTier::new("source", Some(config.source_concurrency))),
            source_unlimited: Arc::new(ExecutorTier::new("source_unlimited", None)),
            animation: Arc::new(ExecutorTier::new(
                "animation",
                Some(config.animation_concurrency),
            )),
        }
    }

    /// The tier that runs a job's source stage.
    pub fn active_source(&self, use_unlimited: bool, use_animation: bool) -> &Arc<ExecutorTier> {
        if use_unlimited {
            &self.source_unlimited
        } else if use_animation {
            &self.animation
        } else {
            &self.source
        }
    }

    /// Shuts every tier down. The first failure is returned after all tiers
    /// have been given their chance to drain.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), EngineError> {
        let (disk_cache, source, source_unlimited, animation) = tokio::join!(
            self.disk_cache.shutdown(grace),
            self.source.shutdown(grace),
            self.source_unlimited.shutdown(grace),
            self.animation.shutdown(grace),
        );
        info!("Executor tiers shut down");
        disk_cache.and(source).and(source_unlimited).and(animation)
    }
}
