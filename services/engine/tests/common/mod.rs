//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use tierload_engine::cache::DiskCache;
use tierload_engine::engine::LoadEvent;
use tierload_engine::error::{DecodeError, FetchError};
use tierload_engine::load::loaders::EncodedBytes;
use tierload_engine::load::{
    DataFetcher, DataSource, DecodeOptions, FetchedData, LoadData, ModelLoader, Priority,
    Registry, ResourceDecoder,
};
use tierload_engine::{Engine, EngineConfig, Payload};
use tierload_key::{DataCacheKey, DataType, Model, ModelKind, Options, ResourceType, SourceKey};

/// Holds fetches until opened.
#[derive(Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn closed() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Fetcher returning canned bytes or a canned error.
pub struct ScriptedFetcher {
    result: Result<Bytes, String>,
    data_source: DataSource,
    gate: Option<Gate>,
    pub calls: AtomicUsize,
    pub cancelled: AtomicBool,
}

impl ScriptedFetcher {
    pub fn ok(data: &'static [u8], data_source: DataSource) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(Bytes::from_static(data)),
            data_source,
            gate: None,
            calls: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message.to_string()),
            data_source: DataSource::Remote,
            gate: None,
            calls: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn gated(data: &'static [u8], data_source: DataSource, gate: &Gate) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(Bytes::from_static(data)),
            data_source,
            gate: Some(gate.clone()),
            calls: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn failing_gated(message: &str, gate: &Gate) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message.to_string()),
            data_source: DataSource::Remote,
            gate: Some(gate.clone()),
            calls: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataFetcher for ScriptedFetcher {
    async fn load_data(&self, _priority: Priority) -> Result<FetchedData, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let mut open = gate.subscribe();
            open.wait_for(|open| *open)
                .await
                .map_err(|_| FetchError::Cancelled)?;
        }
        match &self.result {
            Ok(bytes) => Ok(FetchedData::new(bytes.clone())),
            Err(message) => Err(FetchError::Other(message.clone())),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn data_type(&self) -> DataType {
        DataType::of::<Bytes>()
    }

    fn data_source(&self) -> DataSource {
        self.data_source
    }
}

/// Serves [`Model::Named`] models from one fetcher, keyed by name.
pub struct ScriptedLoader {
    fetcher: Option<Arc<ScriptedFetcher>>,
    alternate_keys: Vec<SourceKey>,
    pub builds: AtomicUsize,
}

impl ScriptedLoader {
    pub fn new(fetcher: Arc<ScriptedFetcher>) -> Arc<Self> {
        Arc::new(Self {
            fetcher: Some(fetcher),
            alternate_keys: Vec::new(),
            builds: AtomicUsize::new(0),
        })
    }

    /// A loader that claims every named model but never builds a fetch.
    pub fn declining() -> Arc<Self> {
        Arc::new(Self {
            fetcher: None,
            alternate_keys: Vec::new(),
            builds: AtomicUsize::new(0),
        })
    }

    pub fn with_alternates(fetcher: Arc<ScriptedFetcher>, keys: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fetcher: Some(fetcher),
            alternate_keys: keys.iter().map(|k| source_key(k)).collect(),
            builds: AtomicUsize::new(0),
        })
    }
}

impl ModelLoader for ScriptedLoader {
    fn handles(&self, model: &Model) -> bool {
        matches!(model, Model::Named(_))
    }

    fn build_load_data(
        &self,
        model: &Model,
        _width: i32,
        _height: i32,
        _options: &Options,
    ) -> Option<LoadData> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let Model::Named(name) = model else {
            return None;
        };
        let fetcher = self.fetcher.clone()?;
        Some(LoadData::new(source_key(name), fetcher).with_alternate_keys(self.alternate_keys.clone()))
    }
}

/// Serves cached files from memory instead of the filesystem.
pub struct CachedFileLoader {
    files: Arc<Mutex<HashMap<PathBuf, Bytes>>>,
    pub fetches: Arc<AtomicUsize>,
}

struct CachedFileFetcher {
    data: Bytes,
    fetches: Arc<AtomicUsize>,
}

#[async_trait]
impl DataFetcher for CachedFileFetcher {
    async fn load_data(&self, _priority: Priority) -> Result<FetchedData, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedData::new(self.data.clone()))
    }

    fn data_type(&self) -> DataType {
        DataType::of::<Bytes>()
    }

    fn data_source(&self) -> DataSource {
        DataSource::Local
    }
}

impl ModelLoader for CachedFileLoader {
    fn handles(&self, model: &Model) -> bool {
        model.as_path().is_some()
    }

    fn build_load_data(
        &self,
        model: &Model,
        _width: i32,
        _height: i32,
        _options: &Options,
    ) -> Option<LoadData> {
        let path = model.as_path()?;
        let data = self.files.lock().unwrap().get(path).cloned()?;
        Some(LoadData::new(
            source_key(&path.to_string_lossy()),
            Arc::new(CachedFileFetcher {
                data,
                fetches: self.fetches.clone(),
            }),
        ))
    }
}

/// A disk cache held in memory. Entries are exposed as fake paths that a
/// [`CachedFileLoader`] from [`MemoryDiskCache::loader`] can read.
#[derive(Default)]
pub struct MemoryDiskCache {
    files: Arc<Mutex<HashMap<PathBuf, Bytes>>>,
    pub gets: Mutex<Vec<String>>,
    pub puts: AtomicUsize,
}

impl MemoryDiskCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn path(key: &DataCacheKey) -> PathBuf {
        PathBuf::from(format!("/memory-disk-cache/{}", key.digest()))
    }

    pub fn insert(&self, key: &DataCacheKey, data: &'static [u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(Self::path(key), Bytes::from_static(data));
    }

    pub fn contains(&self, key: &DataCacheKey) -> bool {
        self.files.lock().unwrap().contains_key(&Self::path(key))
    }

    pub fn loader(&self) -> Arc<CachedFileLoader> {
        Arc::new(CachedFileLoader {
            files: self.files.clone(),
            fetches: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Source keys looked up so far, in order.
    pub fn lookups(&self) -> Vec<String> {
        self.gets.lock().unwrap().clone()
    }
}

impl DiskCache for MemoryDiskCache {
    fn get(&self, key: &DataCacheKey) -> Option<PathBuf> {
        self.gets
            .lock()
            .unwrap()
            .push(key.source().as_str().to_string());
        let path = Self::path(key);
        self.files.lock().unwrap().contains_key(&path).then_some(path)
    }

    fn put(&self, key: &DataCacheKey, data: &[u8]) -> std::io::Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .insert(Self::path(key), Bytes::copy_from_slice(data));
        Ok(())
    }

    fn clear(&self) -> std::io::Result<()> {
        self.files.lock().unwrap().clear();
        Ok(())
    }
}

/// Wraps fetched bytes as [`EncodedBytes`], counting decodes.
#[derive(Default)]
pub struct CountingDecoder {
    pub decodes: AtomicUsize,
}

impl CountingDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl ResourceDecoder for CountingDecoder {
    fn data_type(&self) -> DataType {
        DataType::of::<Bytes>()
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::of::<EncodedBytes>()
    }

    fn decode(&self, data: FetchedData, _options: &DecodeOptions<'_>) -> Result<Payload, DecodeError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        let bytes = data
            .downcast::<Bytes>()
            .map_err(|_| DecodeError::Failed("not bytes".to_string()))?;
        Ok(Payload::new(EncodedBytes::new(bytes)))
    }
}

pub fn source_key(value: &str) -> SourceKey {
    SourceKey::new(value).unwrap()
}

/// A registry serving named models from `loader`, with cached files read
/// through `disk`'s loader when given.
pub fn registry(
    loader: Arc<dyn ModelLoader>,
    decoder: Arc<CountingDecoder>,
    disk: Option<&MemoryDiskCache>,
) -> Registry {
    let mut builder = Registry::builder()
        .append_loader(ModelKind::Named, loader)
        .append_decoder(decoder);
    if let Some(disk) = disk {
        builder = builder.append_loader(ModelKind::Path, disk.loader());
    }
    builder.build()
}

pub fn config() -> EngineConfig {
    EngineConfig {
        shutdown_grace: Duration::from_secs(1),
        sweep_interval: Duration::from_millis(20),
        ..EngineConfig::default()
    }
}

pub fn engine(registry: Registry, disk: Option<Arc<MemoryDiskCache>>) -> Engine {
    engine_with_config(config(), registry, disk)
}

pub fn engine_with_config(
    config: EngineConfig,
    registry: Registry,
    disk: Option<Arc<MemoryDiskCache>>,
) -> Engine {
    let disk: Option<Arc<dyn DiskCache>> = disk.map(|d| d as Arc<dyn DiskCache>);
    Engine::builder(config)
        .registry(registry)
        .disk_cache_factory(Box::new(move || disk.clone()))
        .build()
}

/// Waits for the next outcome delivered to a channel callback.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<LoadEvent>) -> LoadEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for load outcome")
        .expect("callback channel closed")
}

/// Polls `condition` until it holds or five seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
