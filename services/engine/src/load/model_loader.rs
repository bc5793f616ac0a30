use std::fmt;
use std::sync::Arc;

use tierload_key::{Model, Options, SourceKey};

use super::DataFetcher;

/// What a model loader produces for one model: the source it reads and the
/// fetcher that reads it.
#[derive(Clone)]
pub struct LoadData {
    pub source_key: SourceKey,
    /// Other keys the same raw data may have been cached under.
    pub alternate_keys: Vec<SourceKey>,
    pub fetcher: Arc<dyn DataFetcher>,
}

impl LoadData {
    pub fn new(source_key: SourceKey, fetcher: Arc<dyn DataFetcher>) -> Self {
        Self {
            source_key,
            alternate_keys: Vec::new(),
            fetcher,
        }
    }

    #[must_use]
    pub fn with_alternate_keys(mut self, keys: Vec<SourceKey>) -> Self {
        self.alternate_keys = keys;
        self
    }
}

impl fmt::Debug for LoadData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadData")
            .field("source_key", &self.source_key)
            .field("alternate_keys", &self.alternate_keys)
            .field("data_type", &self.fetcher.data_type())
            .finish()
    }
}

/// Translates a model into a fetch operation.
pub trait ModelLoader: Send + Sync {
    /// Cheap capability check; a loader may still return `None` from
    /// [`ModelLoader::build_load_data`].
    fn handles(&self, model: &Model) -> bool;

    fn build_load_data(
        &self,
        model: &Model,
        width: i32,
        height: i32,
        options: &Options,
    ) -> Option<LoadData>;
}
