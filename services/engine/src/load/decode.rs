use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tierload_key::{DataType, Options, ResourceType, TransformationKeys};

use super::FetchedData;
use crate::engine::Payload;
use crate::error::DecodeError;

/// Per-request parameters handed to decoders.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions<'a> {
    pub width: i32,
    pub height: i32,
    pub options: &'a Options,
    /// The request only scales; decoders may skip work that other
    /// transformations would need.
    pub scale_only: bool,
}

/// Turns fetched data of one type into a resource of one type.
pub trait ResourceDecoder: Send + Sync {
    fn data_type(&self) -> DataType;

    fn resource_type(&self) -> ResourceType;

    fn handles(&self, _data: &FetchedData, _options: &Options) -> bool {
        true
    }

    fn decode(&self, data: FetchedData, options: &DecodeOptions<'_>)
        -> Result<Payload, DecodeError>;
}

/// Converts a decoded resource into the requested output type.
pub trait ResourceTranscoder: Send + Sync {
    fn from_type(&self) -> ResourceType;

    fn to_type(&self) -> ResourceType;

    fn transcode(&self, payload: Payload, options: &Options) -> Result<Payload, DecodeError>;
}

/// A transformation applied to a decoded resource before transcoding.
pub trait Transformation: Send + Sync {
    /// Stable identity; two transformations with the same id must produce the
    /// same output for the same input.
    fn id(&self) -> String;

    fn transform(&self, payload: Payload, width: i32, height: i32) -> Result<Payload, DecodeError>;
}

/// Transformations keyed by the resource type they apply to.
#[derive(Clone, Default)]
pub struct Transformations(BTreeMap<ResourceType, Arc<dyn Transformation>>);

impl Transformations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource_type: ResourceType, transformation: Arc<dyn Transformation>) {
        self.0.insert(resource_type, transformation);
    }

    pub fn get(&self, resource_type: &ResourceType) -> Option<&Arc<dyn Transformation>> {
        self.0.get(resource_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The identities that go into a fingerprint.
    pub fn keys(&self) -> TransformationKeys {
        self.0
            .iter()
            .map(|(resource_type, transformation)| (*resource_type, transformation.id()))
            .collect()
    }
}

impl fmt::Debug for Transformations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(k, v)| (k.name(), v.id())))
            .finish()
    }
}
