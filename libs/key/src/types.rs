//! Typed key and type-tag definitions.
//!
//! String keys identify sources and signatures. Type tags identify the Rust
//! type of fetched data, decoded resources and transcoded output.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::define_key;

// =============================================================================
// String Keys
// =============================================================================

define_key!(
    /// Identifies one raw source (a URL, a file path, ...) whose bytes may be
    /// cached on disk.
    SourceKey,
    "source"
);

define_key!(
    /// Invalidation token mixed into every key. Changing the signature of a
    /// request makes every previously cached entry unreachable.
    Signature,
    "signature"
);

impl Signature {
    /// The signature used when a request does not provide one.
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::from("empty"))
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// Type Tags
// =============================================================================

macro_rules! define_type_tag {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name {
            id: TypeId,
            name: &'static str,
        }

        impl $name {
            /// Returns the tag for `T`.
            #[must_use]
            pub fn of<T: Any>() -> Self {
                Self {
                    id: TypeId::of::<T>(),
                    name: std::any::type_name::<T>(),
                }
            }

            /// Returns true if this tag was built for `T`.
            #[must_use]
            pub fn is<T: Any>(&self) -> bool {
                self.id == TypeId::of::<T>()
            }

            /// Returns the Rust type name.
            #[must_use]
            pub fn name(&self) -> &'static str {
                self.name
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl Eq for $name {}

        impl std::hash::Hash for $name {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.id.cmp(&other.id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name)
            }
        }
    };
}

define_type_tag!(
    /// Type of a decoded (or transcoded) resource.
    ResourceType
);

define_type_tag!(
    /// Type of raw data produced by a data fetcher.
    DataType
);
