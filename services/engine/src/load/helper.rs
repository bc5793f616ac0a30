use std::path::Path;
use std::sync::{Arc, OnceLock};

use tierload_key::{DataType, Model, SourceKey};

use super::{DecodeOptions, FetchedData, LoadData, ModelLoader, Registry};
use crate::cache::{DiskCache, LazyDiskCacheProvider};
use crate::engine::{LoadRequest, Payload};
use crate::error::DecodeError;

/// Per-request view of the registry and disk cache shared by the generators
/// of one decode job.
pub struct DecodeHelper {
    request: LoadRequest,
    registry: Arc<Registry>,
    disk_cache: Arc<LazyDiskCacheProvider>,
    load_data: OnceLock<Vec<LoadData>>,
}

impl DecodeHelper {
    pub fn new(
        request: LoadRequest,
        registry: Arc<Registry>,
        disk_cache: Arc<LazyDiskCacheProvider>,
    ) -> Self {
        Self {
            request,
            registry,
            disk_cache,
            load_data: OnceLock::new(),
        }
    }

    pub fn request(&self) -> &LoadRequest {
        &self.request
    }

    /// Fetch operations for the request's model, one per usable loader, in
    /// registration order. Built once.
    pub fn load_data(&self) -> &[LoadData] {
        self.load_data.get_or_init(|| {
            let request = &self.request;
            self.registry
                .model_loaders(request.model())
                .iter()
                .filter_map(|loader| {
                    loader.build_load_data(
                        request.model(),
                        request.width(),
                        request.height(),
                        request.options(),
                    )
                })
                .collect()
        })
    }

    /// Every key the request's raw data may be cached under: each loader's
    /// primary key followed by its alternates, without duplicates.
    pub fn cache_keys(&self) -> Vec<SourceKey> {
        let mut keys: Vec<SourceKey> = Vec::new();
        for load_data in self.load_data() {
            for key in std::iter::once(&load_data.source_key).chain(&load_data.alternate_keys) {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    pub fn disk_cache(&self) -> Arc<dyn DiskCache> {
        self.disk_cache.get_disk_cache()
    }

    /// Loaders able to read a cached file.
    pub fn model_loaders_for_file(&self, file: &Path) -> Vec<Arc<dyn ModelLoader>> {
        self.registry.model_loaders(&Model::path(file))
    }

    pub fn has_load_path(&self, data_type: DataType) -> bool {
        self.registry.has_load_path(
            data_type,
            self.request.resource_type(),
            self.request.transcode_type(),
        )
    }

    pub fn decode(&self, data: FetchedData) -> Result<Payload, DecodeError> {
        let request = &self.request;
        let resource_type = request.resource_type();
        let transformation = request.transformations().get(&resource_type);
        if transformation.is_none() && request.is_transformation_required() {
            return Err(DecodeError::MissingTransformation(resource_type));
        }

        self.registry.decode(
            data,
            resource_type,
            request.transcode_type(),
            transformation,
            &DecodeOptions {
                width: request.width(),
                height: request.height(),
                options: request.options(),
                scale_only: request.is_scale_only(),
            },
        )
    }
}
