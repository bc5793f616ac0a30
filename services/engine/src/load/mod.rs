//! Data acquisition: loaders, fetchers, generators and the decode pipeline.
//!
//! A load walks a list of generators. Each generator tries one way of
//! obtaining raw data (the disk cache, then the origin) and hands the first
//! successful fetch to the decode path registered for its data type.

mod decode;
mod decode_job;
mod fetcher;
mod generator;
mod helper;
pub mod loaders;
mod model_loader;
mod registry;

use serde::Serialize;

pub use decode::{
    DecodeOptions, ResourceDecoder, ResourceTranscoder, Transformation, Transformations,
};
pub(crate) use decode_job::{DecodeJob, JobSink, PipelineHandle};
pub use fetcher::{DataFetcher, FetchedData};
pub use generator::{
    DataCacheGenerator, DataFetcherGenerator, FetcherEvent, FetcherReadyCallback, SourceGenerator,
};
pub use helper::DecodeHelper;
pub use model_loader::{LoadData, ModelLoader};
pub use registry::{Registry, RegistryBuilder};

/// Scheduling hint passed to fetchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Immediate,
    High,
    #[default]
    Normal,
    Low,
}

/// Where a delivered resource or fetched data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Read from the local filesystem or memory.
    Local,
    /// Fetched from a remote origin.
    Remote,
    /// Read from raw data previously written to the disk cache.
    DataDiskCache,
    /// Served from the active set or the memory cache without running a job.
    MemoryCache,
}

impl DataSource {
    /// True if the data was obtained without touching any engine cache.
    pub fn is_fresh(self) -> bool {
        matches!(self, DataSource::Local | DataSource::Remote)
    }
}

/// Decides whether raw data is read from and written to the disk cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiskCacheStrategy {
    /// Never touch the disk cache.
    None,
    /// Read cached data and cache all freshly fetched data.
    Data,
    /// Read cached data and cache only remote data.
    #[default]
    Automatic,
}

impl DiskCacheStrategy {
    /// Whether the disk cache is consulted before the origin.
    pub fn decode_cached_data(self) -> bool {
        !matches!(self, DiskCacheStrategy::None)
    }

    /// Whether data fetched from `source` is written back to the disk cache.
    pub fn is_data_cacheable(self, source: DataSource) -> bool {
        match self {
            DiskCacheStrategy::None => false,
            DiskCacheStrategy::Data => source.is_fresh(),
            DiskCacheStrategy::Automatic => source == DataSource::Remote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automatic_caches_only_remote_data() {
        let strategy = DiskCacheStrategy::Automatic;
        assert!(strategy.decode_cached_data());
        assert!(strategy.is_data_cacheable(DataSource::Remote));
        assert!(!strategy.is_data_cacheable(DataSource::Local));
        assert!(!strategy.is_data_cacheable(DataSource::DataDiskCache));
    }

    #[test]
    fn test_data_caches_fresh_data() {
        let strategy = DiskCacheStrategy::Data;
        assert!(strategy.is_data_cacheable(DataSource::Local));
        assert!(strategy.is_data_cacheable(DataSource::Remote));
        assert!(!strategy.is_data_cacheable(DataSource::MemoryCache));
    }

    #[test]
    fn test_none_skips_disk_cache() {
        let strategy = DiskCacheStrategy::None;
        assert!(!strategy.decode_cached_data());
        assert!(!strategy.is_data_cacheable(DataSource::Remote));
    }
}
