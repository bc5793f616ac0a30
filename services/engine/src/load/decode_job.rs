//! The decode pipeline for one job.
//!
//! Runs on an executor tier, never on the engine actor. It walks the disk
//! cache generator and then the source generator, decodes the first data that
//! arrives, and posts exactly one outcome back to the engine mailbox unless it
//! is cancelled first.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use tierload_key::{DataCacheKey, Fingerprint, SourceKey};

use super::{
    DataCacheGenerator, DataFetcherGenerator, DataSource, DecodeHelper, FetchedData,
    FetcherEvent, SourceGenerator,
};
use crate::actors::ActorHandle;
use crate::engine::{EngineMessage, JobId, Payload};
use crate::error::{LoadCause, LoadError};
use crate::executor::ExecutorTier;

/// Cancels a running pipeline.
#[derive(Debug)]
pub(crate) struct PipelineHandle {
    cancel: watch::Sender<bool>,
}

impl PipelineHandle {
    pub(crate) fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

#[cfg(test)]
impl PipelineHandle {
    /// A handle with no pipeline behind it, plus the flag it controls.
    pub(crate) fn detached() -> (Self, watch::Receiver<bool>) {
        let (cancel, cancelled) = watch::channel(false);
        (Self { cancel }, cancelled)
    }
}

/// Where a pipeline posts its outcome.
#[derive(Debug, Clone)]
pub(crate) struct JobSink {
    mailbox: ActorHandle<EngineMessage>,
    key: Fingerprint,
    job_id: JobId,
    only_cache: bool,
}

impl JobSink {
    pub(crate) fn new(
        mailbox: ActorHandle<EngineMessage>,
        key: Fingerprint,
        job_id: JobId,
        only_cache: bool,
    ) -> Self {
        Self {
            mailbox,
            key,
            job_id,
            only_cache,
        }
    }

    async fn ready(&self, payload: Payload, data_source: DataSource) {
        let msg = EngineMessage::JobReady {
            key: self.key.clone(),
            job_id: self.job_id,
            only_cache: self.only_cache,
            payload,
            data_source,
        };
        if self.mailbox.send(msg).await.is_err() {
            debug!(job_id = %self.job_id, "Engine stopped before job result was delivered");
        }
    }

    async fn failed(&self, error: LoadError) {
        let msg = EngineMessage::JobFailed {
            key: self.key.clone(),
            job_id: self.job_id,
            only_cache: self.only_cache,
            error,
        };
        if self.mailbox.send(msg).await.is_err() {
            debug!(job_id = %self.job_id, "Engine stopped before job failure was delivered");
        }
    }
}

enum Stage {
    /// An outcome was posted or the job was cancelled.
    Done,
    /// Every candidate of the generator failed or missed.
    Exhausted,
}

pub(crate) struct DecodeJob {
    helper: Arc<DecodeHelper>,
    sink: JobSink,
    cancelled: watch::Receiver<bool>,
    causes: Vec<LoadCause>,
}

impl DecodeJob {
    pub(crate) fn new(helper: Arc<DecodeHelper>, sink: JobSink) -> (Self, PipelineHandle) {
        let (cancel, cancelled) = watch::channel(false);
        (
            Self {
                helper,
                sink,
                cancelled,
                causes: Vec::new(),
            },
            PipelineHandle { cancel },
        )
    }

    /// Whether the pipeline starts by reading the disk cache.
    pub(crate) fn will_decode_from_cache(&self) -> bool {
        self.helper
            .request()
            .disk_cache_strategy()
            .decode_cached_data()
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Runs the pipeline. When `reschedule` is set and the disk cache misses,
    /// the source stage is moved onto that tier instead of running here.
    pub(crate) async fn run(mut self, reschedule: Option<Arc<ExecutorTier>>) {
        if self.is_cancelled() {
            debug!(job_id = %self.sink.job_id, "Decode job cancelled before start");
            return;
        }

        if self.will_decode_from_cache() {
            let (tx, rx) = mpsc::unbounded_channel();
            let generator =
                DataCacheGenerator::new(self.helper.cache_keys(), self.helper.clone(), Arc::new(tx));
            if let Stage::Done = self.run_generator(generator, rx).await {
                return;
            }
        }

        if self.helper.request().is_only_retrieve_from_cache() {
            let causes = std::mem::take(&mut self.causes);
            self.sink.failed(LoadError::NotCached { causes }).await;
            return;
        }

        match reschedule {
            Some(tier) => {
                debug!(job_id = %self.sink.job_id, tier = tier.name(), "Rescheduling to source tier");
                let sink = self.sink.clone();
                if let Err(e) = tier.execute(self.run_source()) {
                    warn!(error = %e, "Failed to reschedule decode job");
                    sink.failed(LoadError::EngineStopped).await;
                }
            }
            None => self.run_source().await,
        }
    }

    async fn run_source(mut self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generator = SourceGenerator::new(self.helper.clone(), Arc::new(tx));
        if let Stage::Exhausted = self.run_generator(generator, rx).await {
            let causes = std::mem::take(&mut self.causes);
            self.sink.failed(LoadError::Failed { causes }).await;
        }
    }

    async fn run_generator<G: DataFetcherGenerator>(
        &mut self,
        mut generator: G,
        mut events: mpsc::UnboundedReceiver<FetcherEvent>,
    ) -> Stage {
        loop {
            if !generator.start_next() {
                return Stage::Exhausted;
            }

            let event = tokio::select! {
                biased;

                _ = self.cancelled.wait_for(|cancelled| *cancelled) => {
                    generator.cancel();
                    debug!(job_id = %self.sink.job_id, "Decode job cancelled");
                    return Stage::Done;
                }

                event = events.recv() => event,
            };

            match event {
                Some(FetcherEvent::Ready {
                    source_key,
                    data,
                    data_source,
                    ..
                }) => match self.decode(source_key, data, data_source) {
                    Ok(payload) => {
                        self.sink.ready(payload, data_source).await;
                        return Stage::Done;
                    }
                    Err(cause) => {
                        debug!(cause = %cause, "Decode failed, trying next candidate");
                        self.causes.push(cause);
                    }
                },
                Some(FetcherEvent::Failed {
                    attempted_key,
                    error,
                    data_source,
                    ..
                }) => {
                    debug!(source_key = %attempted_key, error = %error, "Fetch failed, trying next candidate");
                    self.causes
                        .push(LoadCause::fetch(attempted_key, data_source, error));
                }
                None => return Stage::Exhausted,
            }
        }
    }

    fn decode(
        &self,
        source_key: SourceKey,
        data: FetchedData,
        data_source: DataSource,
    ) -> Result<Payload, LoadCause> {
        let request = self.helper.request();
        if request.disk_cache_strategy().is_data_cacheable(data_source) {
            if let Some(bytes) = data.downcast_ref::<Bytes>() {
                self.write_to_disk_cache(&source_key, bytes);
            }
        }

        self.helper
            .decode(data)
            .map_err(|e| LoadCause::decode(source_key, data_source, e))
    }

    fn write_to_disk_cache(&self, source_key: &SourceKey, bytes: &Bytes) {
        let key = DataCacheKey::new(source_key.clone(), self.helper.request().signature().clone());
        match self.helper.disk_cache().put(&key, bytes) {
            Ok(()) => debug!(key = %key, size = bytes.len(), "Wrote data to disk cache"),
            Err(e) => warn!(key = %key, error = %e, "Failed to write data to disk cache"),
        }
    }
}
