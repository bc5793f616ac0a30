//! Macros for defining string-backed key types.

/// Macro to define an immutable string key with a kind label.
///
/// This generates a newtype wrapper around `Arc<str>` with:
/// - A `KIND` constant used in error messages
/// - `new()` that rejects empty strings
/// - `as_str()`, `Display`, `FromStr` and `AsRef<str>`
/// - `Ord`, `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_key!(SourceKey, "source");
///
/// let key = SourceKey::new("https://example.com/a.png")?;
/// ```
#[macro_export]
macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(std::sync::Arc<str>);

        impl $name {
            /// The kind label for this key type.
            pub const KIND: &'static str = $kind;

            /// Creates a key, rejecting empty strings.
            pub fn new(value: impl AsRef<str>) -> Result<Self, $crate::KeyError> {
                let value = value.as_ref();
                if value.is_empty() {
                    return Err($crate::KeyError::Empty { kind: Self::KIND });
                }
                Ok(Self(std::sync::Arc::from(value)))
            }

            /// Returns the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::KeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}
