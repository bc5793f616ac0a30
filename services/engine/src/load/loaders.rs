//! Built-in model loaders, fetchers and the raw bytes decoder.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use tracing::debug;

use tierload_key::{DataType, Model, Options, OptionValue, ResourceType, SourceKey};

use super::{
    DataFetcher, DataSource, DecodeOptions, FetchedData, LoadData, ModelLoader, Priority,
    ResourceDecoder,
};
use crate::engine::{Payload, Resource};
use crate::error::{DecodeError, FetchError};

/// Option key holding an HTTP request timeout in milliseconds.
pub const HTTP_TIMEOUT_MS: &str = "http.timeout_ms";

// =============================================================================
// Files
// =============================================================================

/// Reads a whole file.
#[derive(Debug)]
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataFetcher for FileFetcher {
    async fn load_data(&self, _priority: Priority) -> Result<FetchedData, FetchError> {
        let data = tokio::fs::read(&self.path).await?;
        Ok(FetchedData::new(Bytes::from(data)))
    }

    fn data_type(&self) -> DataType {
        DataType::of::<Bytes>()
    }

    fn data_source(&self) -> DataSource {
        DataSource::Local
    }
}

/// Loads [`Model::Path`] models.
#[derive(Debug, Default)]
pub struct FileLoader;

impl ModelLoader for FileLoader {
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
        let source_key = SourceKey::new(path.to_string_lossy()).ok()?;
        Some(LoadData::new(source_key, Arc::new(FileFetcher::new(path))))
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// Fetches a URL with `reqwest`.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
    timeout: Option<Duration>,
    cancelled: watch::Sender<bool>,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            client,
            url: url.into(),
            timeout: None,
            cancelled,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn fetch(&self) -> Result<Bytes, FetchError> {
        let mut request = self.client.get(&self.url);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl DataFetcher for HttpFetcher {
    async fn load_data(&self, priority: Priority) -> Result<FetchedData, FetchError> {
        debug!(url = %self.url, ?priority, "Fetching remote data");

        let mut cancelled = self.cancelled.subscribe();
        if *cancelled.borrow() {
            return Err(FetchError::Cancelled);
        }

        tokio::select! {
            result = self.fetch() => result.map(FetchedData::new),
            _ = cancelled.wait_for(|c| *c) => Err(FetchError::Cancelled),
        }
    }

    fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    fn data_type(&self) -> DataType {
        DataType::of::<Bytes>()
    }

    fn data_source(&self) -> DataSource {
        DataSource::Remote
    }
}

/// Loads `http` and `https` [`Model::Url`] models.
#[derive(Debug, Clone)]
pub struct HttpLoader {
    client: reqwest::Client,
}

impl HttpLoader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ModelLoader for HttpLoader {
    fn handles(&self, model: &Model) -> bool {
        matches!(model, Model::Url(url) if url.starts_with("http://") || url.starts_with("https://"))
    }

    fn build_load_data(
        &self,
        model: &Model,
        _width: i32,
        _height: i32,
        options: &Options,
    ) -> Option<LoadData> {
        let Model::Url(url) = model else {
            return None;
        };
        let source_key = SourceKey::new(url).ok()?;

        let mut fetcher = HttpFetcher::new(self.client.clone(), url.clone());
        if let Some(OptionValue::Int(ms)) = options.get(HTTP_TIMEOUT_MS) {
            if let Ok(ms) = u64::try_from(*ms) {
                fetcher = fetcher.with_timeout(Duration::from_millis(ms));
            }
        }

        Some(LoadData::new(source_key, Arc::new(fetcher)))
    }
}

// =============================================================================
// In-memory bytes
// =============================================================================

#[derive(Debug)]
struct BytesFetcher {
    bytes: Bytes,
}

#[async_trait]
impl DataFetcher for BytesFetcher {
    async fn load_data(&self, _priority: Priority) -> Result<FetchedData, FetchError> {
        Ok(FetchedData::new(self.bytes.clone()))
    }

    fn data_type(&self) -> DataType {
        DataType::of::<Bytes>()
    }

    fn data_source(&self) -> DataSource {
        DataSource::Local
    }
}

/// Loads [`Model::Bytes`] models. The source key is derived from the content.
#[derive(Debug, Default)]
pub struct BytesLoader;

impl ModelLoader for BytesLoader {
    fn handles(&self, model: &Model) -> bool {
        matches!(model, Model::Bytes(_))
    }

    fn build_load_data(
        &self,
        model: &Model,
        _width: i32,
        _height: i32,
        _options: &Options,
    ) -> Option<LoadData> {
        let Model::Bytes(bytes) = model else {
            return None;
        };
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        let source_key =
            SourceKey::new(format!("bytes:{}:{:016x}", bytes.len(), hasher.finish())).ok()?;

        Some(LoadData::new(
            source_key,
            Arc::new(BytesFetcher {
                bytes: bytes.clone(),
            }),
        ))
    }
}

// =============================================================================
// Raw bytes resource
// =============================================================================

/// Undecoded bytes held as a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBytes(Bytes);

impl EncodedBytes {
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn bytes(&self) -> Bytes {
        self.0.clone()
    }
}

impl Resource for EncodedBytes {
    fn size_bytes(&self) -> usize {
        self.0.len()
    }
}

/// Wraps fetched [`Bytes`] as [`EncodedBytes`] without decoding them.
#[derive(Debug, Default)]
pub struct BytesDecoder;

impl ResourceDecoder for BytesDecoder {
    fn data_type(&self) -> DataType {
        DataType::of::<Bytes>()
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::of::<EncodedBytes>()
    }

    fn decode(
        &self,
        data: FetchedData,
        _options: &DecodeOptions<'_>,
    ) -> Result<Payload, DecodeError> {
        let actual = data.data_type();
        let bytes = data.downcast::<Bytes>().map_err(|_| {
            DecodeError::Failed(format!("expected raw bytes, got {actual}"))
        })?;
        Ok(Payload::new(EncodedBytes::new(bytes)))
    }
}
