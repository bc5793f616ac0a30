//! Cursor behaviour of the disk cache and source generators.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use tierload_engine::cache::{DiskCache, LazyDiskCacheProvider};
use tierload_engine::error::FetchError;
use tierload_engine::load::loaders::EncodedBytes;
use tierload_engine::load::{
    DataCacheGenerator, DataFetcher, DataFetcherGenerator, DataSource, DecodeHelper, FetchedData,
    FetcherEvent, LoadData, ModelLoader, Priority, Registry, SourceGenerator,
};
use tierload_engine::LoadRequest;
use tierload_key::{DataCacheKey, DataType, Model, ModelKind, Options, Signature};

use common::{source_key, CountingDecoder, MemoryDiskCache, ScriptedFetcher, ScriptedLoader};

/// Claims every path but never builds a fetch.
#[derive(Default)]
struct DecliningPathLoader {
    builds: AtomicUsize,
}

impl ModelLoader for DecliningPathLoader {
    fn handles(&self, model: &Model) -> bool {
        model.as_path().is_some()
    }

    fn build_load_data(
        &self,
        _model: &Model,
        _width: i32,
        _height: i32,
        _options: &Options,
    ) -> Option<LoadData> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        None
    }
}

/// Reads any path as text, a data type no decoder in these tests accepts.
#[derive(Default)]
struct TextFileLoader {
    builds: AtomicUsize,
    fetches: Arc<AtomicUsize>,
}

struct TextFetcher {
    fetches: Arc<AtomicUsize>,
}

#[async_trait]
impl DataFetcher for TextFetcher {
    async fn load_data(&self, _priority: Priority) -> Result<FetchedData, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedData::new(String::from("text")))
    }

    fn data_type(&self) -> DataType {
        DataType::of::<String>()
    }

    fn data_source(&self) -> DataSource {
        DataSource::Local
    }
}

impl ModelLoader for TextFileLoader {
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
        self.builds.fetch_add(1, Ordering::SeqCst);
        let path = model.as_path()?;
        Some(LoadData::new(
            source_key(&path.to_string_lossy()),
            Arc::new(TextFetcher {
                fetches: self.fetches.clone(),
            }),
        ))
    }
}

fn helper(registry: Registry, disk: Option<Arc<MemoryDiskCache>>) -> Arc<DecodeHelper> {
    let disk: Option<Arc<dyn DiskCache>> = disk.map(|d| d as Arc<dyn DiskCache>);
    let provider = LazyDiskCacheProvider::new(Box::new(move || disk.clone()));
    Arc::new(DecodeHelper::new(
        LoadRequest::of::<EncodedBytes>(Model::named("a")),
        Arc::new(registry),
        Arc::new(provider),
    ))
}

#[tokio::test]
async fn test_data_cache_generator_walks_keys_then_loaders() {
    let disk = MemoryDiskCache::new();
    disk.insert(&DataCacheKey::new(source_key("k2"), Signature::empty()), b"cached");

    let declining = Arc::new(DecliningPathLoader::default());
    let registry = Registry::builder()
        .append_loader(ModelKind::Path, declining.clone())
        .append_loader(ModelKind::Path, disk.loader())
        .append_decoder(CountingDecoder::new())
        .build();

    let (tx, mut rx) = mpsc::unbounded_channel::<FetcherEvent>();
    let mut generator = DataCacheGenerator::new(
        vec![source_key("k1"), source_key("k2"), source_key("k3")],
        helper(registry, Some(disk.clone())),
        Arc::new(tx),
    );

    assert!(generator.start_next());
    match rx.recv().await.unwrap() {
        FetcherEvent::Ready {
            source_key: key,
            data,
            data_source,
            ..
        } => {
            assert_eq!(key, source_key("k2"));
            assert_eq!(data_source, DataSource::DataDiskCache);
            assert_eq!(data.downcast_ref::<bytes::Bytes>().unwrap().as_ref(), b"cached");
        }
        other => panic!("expected data, got {other:?}"),
    }
    assert_eq!(disk.lookups(), vec!["k1", "k2"]);
    assert_eq!(declining.builds.load(Ordering::SeqCst), 1);

    assert!(!generator.start_next());
    assert_eq!(disk.lookups(), vec!["k1", "k2", "k3"]);
}

#[tokio::test]
async fn test_data_cache_generator_without_disk_cache_is_empty() {
    let registry = Registry::builder()
        .append_decoder(CountingDecoder::new())
        .build();
    let (tx, _rx) = mpsc::unbounded_channel::<FetcherEvent>();
    let mut generator =
        DataCacheGenerator::new(vec![source_key("k1")], helper(registry, None), Arc::new(tx));

    assert!(!generator.start_next());
}

#[tokio::test]
async fn test_source_generator_moves_to_next_loader_after_failure() {
    let failing = ScriptedFetcher::failing("first loader down");
    let working = ScriptedFetcher::ok(b"second", DataSource::Remote);
    let registry = Registry::builder()
        .append_loader(ModelKind::Named, ScriptedLoader::new(failing.clone()))
        .append_loader(ModelKind::Named, ScriptedLoader::new(working.clone()))
        .append_decoder(CountingDecoder::new())
        .build();

    let (tx, mut rx) = mpsc::unbounded_channel::<FetcherEvent>();
    let mut generator = SourceGenerator::new(helper(registry, None), Arc::new(tx));

    assert!(generator.start_next());
    assert!(matches!(
        rx.recv().await.unwrap(),
        FetcherEvent::Failed {
            data_source: DataSource::Remote,
            ..
        }
    ));

    assert!(generator.start_next());
    assert!(matches!(
        rx.recv().await.unwrap(),
        FetcherEvent::Ready {
            data_source: DataSource::Remote,
            ..
        }
    ));
    assert_eq!(failing.calls(), 1);
    assert_eq!(working.calls(), 1);

    assert!(!generator.start_next());
}

#[tokio::test]
async fn test_cache_keys_merge_alternates_without_duplicates() {
    let fetcher = ScriptedFetcher::ok(b"x", DataSource::Remote);
    let registry = Registry::builder()
        .append_loader(
            ModelKind::Named,
            ScriptedLoader::with_alternates(fetcher.clone(), &["alt", "a"]),
        )
        .append_loader(
            ModelKind::Named,
            ScriptedLoader::with_alternates(fetcher, &["other"]),
        )
        .append_decoder(CountingDecoder::new())
        .build();

    let keys = helper(registry, None).cache_keys();
    assert_eq!(
        keys,
        vec![source_key("a"), source_key("alt"), source_key("other")]
    );
}

#[tokio::test]
async fn test_source_generator_skips_loaders_without_decode_path() {
    let fetcher = ScriptedFetcher::ok(b"x", DataSource::Remote);
    let registry = Registry::builder()
        .append_loader(ModelKind::Named, ScriptedLoader::new(fetcher.clone()))
        .build();

    let (tx, _rx) = mpsc::unbounded_channel::<FetcherEvent>();
    let mut generator = SourceGenerator::new(helper(registry, None), Arc::new(tx));

    assert!(!generator.start_next());
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_data_cache_generator_skips_loader_without_decode_path() {
    let disk = MemoryDiskCache::new();
    disk.insert(&DataCacheKey::new(source_key("k1"), Signature::empty()), b"cached");

    let text = Arc::new(TextFileLoader::default());
    let registry = Registry::builder()
        .append_loader(ModelKind::Path, text.clone())
        .append_loader(ModelKind::Path, disk.loader())
        .append_decoder(CountingDecoder::new())
        .build();

    let (tx, mut rx) = mpsc::unbounded_channel::<FetcherEvent>();
    let mut generator = DataCacheGenerator::new(
        vec![source_key("k1")],
        helper(registry, Some(disk.clone())),
        Arc::new(tx),
    );

    assert!(generator.start_next());
    match rx.recv().await.unwrap() {
        FetcherEvent::Ready {
            data, data_source, ..
        } => {
            assert_eq!(data_source, DataSource::DataDiskCache);
            assert!(data.downcast_ref::<bytes::Bytes>().is_some());
        }
        other => panic!("expected data, got {other:?}"),
    }
    assert_eq!(text.builds.load(Ordering::SeqCst), 1);
    assert_eq!(text.fetches.load(Ordering::SeqCst), 0);

    assert!(!generator.start_next());
}
