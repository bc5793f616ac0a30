//! Configuration for the engine.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Byte budget of the memory cache.
    pub memory_cache_bytes: usize,

    /// Directory of the disk cache. No disk cache when unset.
    pub disk_cache_dir: Option<PathBuf>,

    /// Concurrent fetches on the source tier.
    pub source_concurrency: usize,

    /// Concurrent reads on the disk cache tier.
    pub disk_cache_concurrency: usize,

    /// Concurrent fetches on the animation tier.
    pub animation_concurrency: usize,

    /// Number of idle jobs kept for reuse.
    pub job_pool_capacity: usize,

    /// Keep the payload of active resources so a leaked one can still be cached.
    pub retain_active_resources: bool,

    /// How long shutdown waits for running tasks before aborting them.
    pub shutdown_grace: Duration,

    /// Interval of the sweep that reclaims dropped active resources.
    pub sweep_interval: Duration,

    /// Capacity of the engine actor's mailbox.
    pub mailbox_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism().map_or(4, |n| n.get());
        Self {
            memory_cache_bytes: 64 * 1024 * 1024,
            disk_cache_dir: None,
            source_concurrency: cpus.clamp(1, 4),
            disk_cache_concurrency: 1,
            animation_concurrency: if cpus >= 4 { 2 } else { 1 },
            job_pool_capacity: 150,
            retain_active_resources: false,
            shutdown_grace: Duration::from_secs(5),
            sweep_interval: Duration::from_millis(500),
            mailbox_size: 1024,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `TIERLOAD_*` environment variables. Unset or
    /// unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let memory_cache_bytes = env_parse("TIERLOAD_MEMORY_CACHE_BYTES")
            .unwrap_or(defaults.memory_cache_bytes);

        let disk_cache_dir = std::env::var("TIERLOAD_DISK_CACHE_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let source_concurrency = env_parse("TIERLOAD_SOURCE_CONCURRENCY")
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.source_concurrency);

        let disk_cache_concurrency = env_parse("TIERLOAD_DISK_CACHE_CONCURRENCY")
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.disk_cache_concurrency);

        let animation_concurrency = env_parse("TIERLOAD_ANIMATION_CONCURRENCY")
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.animation_concurrency);

        let job_pool_capacity =
            env_parse("TIERLOAD_JOB_POOL_CAPACITY").unwrap_or(defaults.job_pool_capacity);

        let retain_active_resources = env_parse("TIERLOAD_RETAIN_ACTIVE_RESOURCES")
            .unwrap_or(defaults.retain_active_resources);

        let shutdown_grace = env_parse("TIERLOAD_SHUTDOWN_GRACE_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.shutdown_grace);

        let sweep_interval = env_parse("TIERLOAD_SWEEP_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.sweep_interval);

        let mailbox_size = env_parse("TIERLOAD_MAILBOX_SIZE")
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.mailbox_size);

        Self {
            memory_cache_bytes,
            disk_cache_dir,
            source_concurrency,
            disk_cache_concurrency,
            animation_concurrency,
            job_pool_capacity,
            retain_active_resources,
            shutdown_grace,
            sweep_interval,
            mailbox_size,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.job_pool_capacity, 150);
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert!(config.source_concurrency >= 1);
        assert!(config.disk_cache_dir.is_none());
    }
}
