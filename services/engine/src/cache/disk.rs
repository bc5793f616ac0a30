//! Persistent cache of raw fetched data.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use tierload_key::DataCacheKey;

/// Raw data storage keyed by [`DataCacheKey`]. Implementations must tolerate
/// concurrent use from several executor tiers.
pub trait DiskCache: Send + Sync {
    /// Path of the cached file, if present.
    fn get(&self, key: &DataCacheKey) -> Option<PathBuf>;

    fn put(&self, key: &DataCacheKey, data: &[u8]) -> io::Result<()>;

    fn clear(&self) -> io::Result<()>;
}

/// Builds the disk cache on first use.
pub trait DiskCacheFactory: Send + Sync {
    fn build(&self) -> Option<Arc<dyn DiskCache>>;
}

impl<F> DiskCacheFactory for F
where
    F: Fn() -> Option<Arc<dyn DiskCache>> + Send + Sync,
{
    fn build(&self) -> Option<Arc<dyn DiskCache>> {
        self()
    }
}

// =============================================================================
// Filesystem
// =============================================================================

const TMP_MARKER: &str = ".tmp-";

/// One file per key, named by the key digest.
#[derive(Debug)]
pub struct FileDiskCache {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileDiskCache {
    /// Opens (and creates) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &DataCacheKey) -> PathBuf {
        self.dir.join(key.digest())
    }
}

impl DiskCache for FileDiskCache {
    fn get(&self, key: &DataCacheKey) -> Option<PathBuf> {
        let path = self.path_for(key);
        path.is_file().then_some(path)
    }

    fn put(&self, key: &DataCacheKey, data: &[u8]) -> io::Result<()> {
        let path = self.path_for(key);
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(
            "{}{TMP_MARKER}{}-{}",
            key.digest(),
            std::process::id(),
            n
        ));

        // Readers only ever see complete files.
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    /// Removes every complete entry. Files a concurrent `put` is still writing
    /// are left to that `put`, and entries that vanish mid-walk are skipped.
    fn clear(&self) -> io::Result<()> {
        let mut removed = 0usize;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().contains(TMP_MARKER) {
                continue;
            }
            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => {}
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            }
            if remove_entry(&entry.path())? {
                removed += 1;
            }
        }
        info!(dir = %self.dir.display(), removed, "Cleared disk cache");
        Ok(())
    }
}

/// Removes `path`, reporting false if it was already gone.
fn remove_entry(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Opens a [`FileDiskCache`] in a fixed directory.
#[derive(Debug, Clone)]
pub struct FileDiskCacheFactory {
    dir: PathBuf,
}

impl FileDiskCacheFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DiskCacheFactory for FileDiskCacheFactory {
    fn build(&self) -> Option<Arc<dyn DiskCache>> {
        match FileDiskCache::open(&self.dir) {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to open disk cache");
                None
            }
        }
    }
}

/// A disk cache that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskCacheAdapter;

impl DiskCache for DiskCacheAdapter {
    fn get(&self, _key: &DataCacheKey) -> Option<PathBuf> {
        None
    }

    fn put(&self, _key: &DataCacheKey, _data: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        Ok(())
    }
}

// =============================================================================
// Lazy provider
// =============================================================================

/// Builds the disk cache from its factory the first time it is needed.
pub struct LazyDiskCacheProvider {
    factory: Box<dyn DiskCacheFactory>,
    cache: OnceLock<Arc<dyn DiskCache>>,
}

impl LazyDiskCacheProvider {
    pub fn new(factory: Box<dyn DiskCacheFactory>) -> Self {
        Self {
            factory,
            cache: OnceLock::new(),
        }
    }

    /// Returns the disk cache, falling back to [`DiskCacheAdapter`] when the
    /// factory produces nothing.
    pub fn get_disk_cache(&self) -> Arc<dyn DiskCache> {
        self.cache
            .get_or_init(|| match self.factory.build() {
                Some(cache) => cache,
                None => {
                    debug!("No disk cache available, using no-op adapter");
                    Arc::new(DiskCacheAdapter)
                }
            })
            .clone()
    }

    pub fn is_created(&self) -> bool {
        self.cache.get().is_some()
    }
}
