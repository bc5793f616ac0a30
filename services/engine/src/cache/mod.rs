//! Memory and disk cache tiers.

mod disk;
mod memory;

pub use disk::{
    DiskCache, DiskCacheAdapter, DiskCacheFactory, FileDiskCache, FileDiskCacheFactory,
    LazyDiskCacheProvider,
};
pub use memory::{LruResourceCache, MemoryCache, ResourceRemovedListener};
