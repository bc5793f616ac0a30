//! Data fetcher generators.
//!
//! A generator is a resumable strategy over one way of obtaining raw data.
//! Each call to `start_next` starts at most one fetch; its outcome arrives
//! through the generator's [`FetcherReadyCallback`]. On failure the owner calls
//! `start_next` again to try the next candidate.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use tierload_key::{DataCacheKey, Model, SourceKey};

use super::{DataFetcher, DataSource, DecodeHelper, FetchedData, ModelLoader, Priority};
use crate::error::FetchError;

/// Receives the outcome of a fetch started by a generator.
pub trait FetcherReadyCallback: Send + Sync {
    fn on_data_fetcher_ready(
        &self,
        source_key: SourceKey,
        data: FetchedData,
        fetcher: Arc<dyn DataFetcher>,
        data_source: DataSource,
        attempted_key: SourceKey,
    );

    fn on_data_fetcher_failed(
        &self,
        attempted_key: SourceKey,
        error: FetchError,
        fetcher: Arc<dyn DataFetcher>,
        data_source: DataSource,
    );
}

/// Fetch outcome forwarded over a channel.
pub enum FetcherEvent {
    Ready {
        source_key: SourceKey,
        data: FetchedData,
        fetcher: Arc<dyn DataFetcher>,
        data_source: DataSource,
        attempted_key: SourceKey,
    },
    Failed {
        attempted_key: SourceKey,
        error: FetchError,
        fetcher: Arc<dyn DataFetcher>,
        data_source: DataSource,
    },
}

impl fmt::Debug for FetcherEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetcherEvent::Ready {
                source_key,
                data,
                data_source,
                ..
            } => f
                .debug_struct("Ready")
                .field("source_key", source_key)
                .field("data", data)
                .field("data_source", data_source)
                .finish_non_exhaustive(),
            FetcherEvent::Failed {
                attempted_key,
                error,
                data_source,
                ..
            } => f
                .debug_struct("Failed")
                .field("attempted_key", attempted_key)
                .field("error", error)
                .field("data_source", data_source)
                .finish_non_exhaustive(),
        }
    }
}

impl FetcherReadyCallback for mpsc::UnboundedSender<FetcherEvent> {
    fn on_data_fetcher_ready(
        &self,
        source_key: SourceKey,
        data: FetchedData,
        fetcher: Arc<dyn DataFetcher>,
        data_source: DataSource,
        attempted_key: SourceKey,
    ) {
        let _ = self.send(FetcherEvent::Ready {
            source_key,
            data,
            fetcher,
            data_source,
            attempted_key,
        });
    }

    fn on_data_fetcher_failed(
        &self,
        attempted_key: SourceKey,
        error: FetchError,
        fetcher: Arc<dyn DataFetcher>,
        data_source: DataSource,
    ) {
        let _ = self.send(FetcherEvent::Failed {
            attempted_key,
            error,
            fetcher,
            data_source,
        });
    }
}

/// A resumable data acquisition strategy.
pub trait DataFetcherGenerator: Send {
    /// Starts the next candidate fetch. Returns false once every candidate has
    /// been tried.
    fn start_next(&mut self) -> bool;

    /// Cancels the in-flight fetch, if any. Cursors are left untouched.
    fn cancel(&mut self);
}

struct InFlight {
    fetcher: Arc<dyn DataFetcher>,
    task: JoinHandle<()>,
}

impl InFlight {
    fn cancel(self) {
        self.fetcher.cancel();
        self.task.abort();
    }
}

fn start_fetch(
    fetcher: Arc<dyn DataFetcher>,
    source_key: SourceKey,
    data_source: DataSource,
    priority: Priority,
    callback: Arc<dyn FetcherReadyCallback>,
) -> InFlight {
    let task_fetcher = fetcher.clone();
    let task = tokio::spawn(async move {
        match task_fetcher.load_data(priority).await {
            Ok(data) => callback.on_data_fetcher_ready(
                source_key.clone(),
                data,
                task_fetcher,
                data_source,
                source_key,
            ),
            Err(error) => {
                callback.on_data_fetcher_failed(source_key, error, task_fetcher, data_source)
            }
        }
    });
    InFlight { fetcher, task }
}

// =============================================================================
// Disk cache
// =============================================================================

/// Looks for raw data cached on disk under any of the request's source keys.
///
/// The outer cursor walks the source keys; on a disk hit the inner cursor walks
/// the loaders that can read the cached file. Every (key, loader) pair is tried
/// at most once, in order.
pub struct DataCacheGenerator {
    cache_keys: Vec<SourceKey>,
    source_id_index: usize,
    source_key: Option<SourceKey>,
    cache_file: Option<PathBuf>,
    model_loaders: Vec<Arc<dyn ModelLoader>>,
    model_loader_index: usize,
    helper: Arc<DecodeHelper>,
    callback: Arc<dyn FetcherReadyCallback>,
    in_flight: Option<InFlight>,
}

impl DataCacheGenerator {
    pub fn new(
        cache_keys: Vec<SourceKey>,
        helper: Arc<DecodeHelper>,
        callback: Arc<dyn FetcherReadyCallback>,
    ) -> Self {
        Self {
            cache_keys,
            source_id_index: 0,
            source_key: None,
            cache_file: None,
            model_loaders: Vec::new(),
            model_loader_index: 0,
            helper,
            callback,
            in_flight: None,
        }
    }

    fn has_next_model_loader(&self) -> bool {
        self.model_loader_index < self.model_loaders.len()
    }

    /// Moves the outer cursor to the next source key with a disk hit.
    fn advance_source(&mut self) -> bool {
        let disk_cache = self.helper.disk_cache();
        let signature = self.helper.request().signature().clone();

        while let Some(source_key) = self.cache_keys.get(self.source_id_index).cloned() {
            self.source_id_index += 1;

            let key = DataCacheKey::new(source_key.clone(), signature.clone());
            if let Some(file) = disk_cache.get(&key) {
                debug!(source_key = %source_key, file = %file.display(), "Disk cache hit");
                self.model_loaders = self.helper.model_loaders_for_file(&file);
                self.model_loader_index = 0;
                self.cache_file = Some(file);
                self.source_key = Some(source_key);
                return true;
            }
        }
        false
    }
}

impl DataFetcherGenerator for DataCacheGenerator {
    fn start_next(&mut self) -> bool {
        loop {
            while !self.has_next_model_loader() {
                if !self.advance_source() {
                    return false;
                }
            }

            let loader = self.model_loaders[self.model_loader_index].clone();
            self.model_loader_index += 1;

            let (Some(file), Some(source_key)) = (&self.cache_file, &self.source_key) else {
                continue;
            };
            let request = self.helper.request();
            let Some(load_data) = loader.build_load_data(
                &Model::path(file),
                request.width(),
                request.height(),
                request.options(),
            ) else {
                continue;
            };
            if !self.helper.has_load_path(load_data.fetcher.data_type()) {
                continue;
            }

            self.in_flight = Some(start_fetch(
                load_data.fetcher,
                source_key.clone(),
                DataSource::DataDiskCache,
                request.priority(),
                self.callback.clone(),
            ));
            return true;
        }
    }

    fn cancel(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel();
        }
    }
}

// =============================================================================
// Source
// =============================================================================

/// Fetches from the origin with each loader's fetcher, in loader order.
pub struct SourceGenerator {
    load_data_index: usize,
    helper: Arc<DecodeHelper>,
    callback: Arc<dyn FetcherReadyCallback>,
    in_flight: Option<InFlight>,
}

impl SourceGenerator {
    pub fn new(helper: Arc<DecodeHelper>, callback: Arc<dyn FetcherReadyCallback>) -> Self {
        Self {
            load_data_index: 0,
            helper,
            callback,
            in_flight: None,
        }
    }
}

impl DataFetcherGenerator for SourceGenerator {
    fn start_next(&mut self) -> bool {
        let load_data = self.helper.load_data();
        while let Some(data) = load_data.get(self.load_data_index) {
            self.load_data_index += 1;

            if !self.helper.has_load_path(data.fetcher.data_type()) {
                continue;
            }
            self.in_flight = Some(start_fetch(
                data.fetcher.clone(),
                data.source_key.clone(),
                data.fetcher.data_source(),
                self.helper.request().priority(),
                self.callback.clone(),
            ));
            return true;
        }
        false
    }

    fn cancel(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel();
        }
    }
}
