//! Persistent key for raw source data in the disk cache.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::{Signature, SourceKey};

/// Disk cache key for the unmodified source data of one source.
///
/// Deliberately distinct from [`crate::Fingerprint`]: raw data is shared by
/// every request for the same source regardless of size, transformations or
/// output type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataCacheKey {
    source: SourceKey,
    signature: Signature,
}

impl DataCacheKey {
    pub fn new(source: SourceKey, signature: Signature) -> Self {
        Self { source, signature }
    }

    pub fn source(&self) -> &SourceKey {
        &self.source
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Stable hex digest of the key, safe for use as a file name.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.signature.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for DataCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataCacheKey{{source={}, signature={}}}", self.source, self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(source: &str, signature: &str) -> DataCacheKey {
        DataCacheKey::new(
            SourceKey::new(source).unwrap(),
            Signature::new(signature).unwrap(),
        )
    }

    #[test]
    fn test_digest_deterministic() {
        let a = key("https://example.com/a.png", "v1");
        let b = key("https://example.com/a.png", "v1");

        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
        assert!(a.digest().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_digest_depends_on_signature() {
        let a = key("https://example.com/a.png", "v1");
        let b = key("https://example.com/a.png", "v2");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_digest_field_boundary() {
        // "ab" + "c" must not collide with "a" + "bc"
        assert_ne!(key("ab", "c").digest(), key("a", "bc").digest());
    }
}
