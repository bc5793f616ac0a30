//! tierload Engine Library
//!
//! A resource loader that deduplicates concurrent requests and serves them
//! from the cheapest tier that has the answer.
//!
//! ## Architecture
//!
//! ```text
//! Engine (front)
//! └── EngineActor              (active set, memory cache, jobs)
//!     └── EngineJob(key)       (one per in-flight fingerprint)
//!         └── DecodeJob        (runs on an executor tier)
//!             ├── DataCacheGenerator  (disk cache)
//!             └── SourceGenerator     (origin)
//! ```
//!
//! ## Modules
//!
//! - `actors`: Actor framework the engine runs on
//! - `cache`: Memory and disk cache tiers
//! - `engine`: Engine, tracked resources, jobs
//! - `executor`: Bounded task tiers
//! - `load`: Loaders, fetchers, generators, decode paths

pub mod actors;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod load;

pub use config::EngineConfig;
pub use engine::{
    ChannelCallback, Engine, EngineBuilder, EngineResource, EngineStatsSnapshot, JobId, LoadEvent,
    LoadRequest, LoadStatus, Loaded, Payload, Resource, ResourceCallback,
};
pub use error::{DecodeError, EngineError, FetchError, LoadError, ResourceError};
pub use load::{DataSource, DiskCacheStrategy, Priority};
