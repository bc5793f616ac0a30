//! # tierload-key
//!
//! Identity types for the tierload resource engine.
//!
//! ## Design Principles
//!
//! - A [`Fingerprint`] is the in-memory identity of a load request and is only
//!   ever used to multiplex identical requests; it is never persisted
//! - A [`DataCacheKey`] is the persistent identity of raw source data on disk and
//!   is derived from a much smaller set of fields (source key + signature)
//! - All keys are immutable once built, so hashes are computed eagerly
//! - Maps inside keys (options, transformations) compare order-independently
//!
//! ## Example
//!
//! ```ignore
//! let fingerprint = Fingerprint::builder(Model::url("https://example.com/a.png"))
//!     .size(200, 100)
//!     .resource_type(ResourceType::of::<Bitmap>())
//!     .transcode_type(ResourceType::of::<Bitmap>())
//!     .build()?;
//! ```

mod error;
mod fingerprint;
mod macros;
mod model;
mod options;
mod persistent;
mod types;

pub use error::KeyError;
pub use fingerprint::{Fingerprint, FingerprintBuilder, SIZE_ORIGINAL};
pub use model::{Model, ModelKind};
pub use options::{OptionValue, Options, TransformationKeys};
pub use persistent::DataCacheKey;
pub use types::{DataType, ResourceType, Signature, SourceKey};
