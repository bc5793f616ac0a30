//! Error types for the engine.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tierload_key::{DataType, KeyError, ResourceType, SourceKey};

use crate::load::DataSource;

/// Failure of a single data fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("fetch cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Failure turning fetched data into a resource.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no decode path from {data} to {resource}")]
    NoDecodePath { data: DataType, resource: ResourceType },

    #[error("no transcoder from {from} to {to}")]
    NoTranscoder { from: ResourceType, to: ResourceType },

    #[error("transformation required for {0} but none was provided")]
    MissingTransformation(ResourceType),

    #[error("decoder produced {actual}, expected {expected}")]
    UnexpectedType {
        expected: ResourceType,
        actual: ResourceType,
    },

    #[error("decode failed: {0}")]
    Failed(String),
}

/// One failed attempt recorded while walking the data generators.
#[derive(Debug, Clone)]
pub struct LoadCause {
    pub source_key: Option<SourceKey>,
    pub data_source: Option<DataSource>,
    pub error: Arc<dyn std::error::Error + Send + Sync>,
}

impl LoadCause {
    pub fn fetch(source_key: SourceKey, data_source: DataSource, error: FetchError) -> Self {
        Self {
            source_key: Some(source_key),
            data_source: Some(data_source),
            error: Arc::new(error),
        }
    }

    pub fn decode(source_key: SourceKey, data_source: DataSource, error: DecodeError) -> Self {
        Self {
            source_key: Some(source_key),
            data_source: Some(data_source),
            error: Arc::new(error),
        }
    }
}

impl fmt::Display for LoadCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source_key, &self.data_source) {
            (Some(key), Some(source)) => write!(f, "{key} ({source:?}): {}", self.error),
            (Some(key), None) => write!(f, "{key}: {}", self.error),
            _ => write!(f, "{}", self.error),
        }
    }
}

/// Terminal outcome of a failed load. Every subscriber of a job receives a
/// clone of the same value.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("failed to load resource ({} cause(s))", .causes.len())]
    Failed { causes: Vec<LoadCause> },

    #[error("resource is not cached and the load was limited to the cache")]
    NotCached { causes: Vec<LoadCause> },

    #[error("engine stopped")]
    EngineStopped,
}

impl LoadError {
    /// Attempts that failed before the load gave up.
    pub fn causes(&self) -> &[LoadCause] {
        match self {
            LoadError::Failed { causes } | LoadError::NotCached { causes } => causes,
            LoadError::EngineStopped => &[],
        }
    }
}

/// Contract violations on tracked resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("cannot release a resource that is not acquired")]
    NotAcquired,

    #[error("cannot acquire a recycled resource")]
    AcquireRecycled,

    #[error("cannot recycle a resource while it is acquired")]
    RecycleAcquired,

    #[error("cannot recycle a resource that has already been recycled")]
    AlreadyRecycled,

    #[error("resource belongs to a different engine")]
    ForeignEngine,

    #[error("resource was never handed out by an engine")]
    Untracked,
}

/// Engine-level failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine stopped")]
    EngineStopped,

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("invalid request: {0}")]
    Key(#[from] KeyError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("executor tier {tier} did not terminate within the grace period")]
    ShutdownTimeout { tier: &'static str },

    #[error("executor tier {tier} is shut down")]
    Rejected { tier: &'static str },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<crate::actors::ActorError> for EngineError {
    fn from(_: crate::actors::ActorError) -> Self {
        EngineError::EngineStopped
    }
}
