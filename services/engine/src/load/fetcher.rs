use std::any::Any;
use std::fmt;

use async_trait::async_trait;
use tierload_key::DataType;

use super::{DataSource, Priority};
use crate::error::FetchError;

/// Raw data produced by a fetcher, tagged with its Rust type.
pub struct FetchedData {
    data_type: DataType,
    value: Box<dyn Any + Send + Sync>,
}

impl FetchedData {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            data_type: DataType::of::<T>(),
            value: Box::new(value),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Takes the value out, or gives the data back if it holds another type.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let data_type = self.data_type;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { data_type, value }),
        }
    }
}

impl fmt::Debug for FetchedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedData")
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

/// One fetch operation over one source.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    async fn load_data(&self, priority: Priority) -> Result<FetchedData, FetchError>;

    /// Best-effort cancellation of an in-flight `load_data`.
    fn cancel(&self) {}

    /// The type of data `load_data` produces.
    fn data_type(&self) -> DataType;

    fn data_source(&self) -> DataSource;
}
