//! In-memory request fingerprint.
//!
//! A fingerprint identifies one load request for multiplexing: two requests
//! with equal fingerprints share the same active resource, the same memory
//! cache entry and the same in-flight job.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::{KeyError, Model, Options, ResourceType, Signature, TransformationKeys};

/// Requests the original size of the source instead of a target size.
pub const SIZE_ORIGINAL: i32 = i32::MIN;

/// Composite identity of a load request.
///
/// Cloning is cheap (the fields are shared). The hash is computed once, at
/// construction, since no field can change afterwards.
#[derive(Clone)]
pub struct Fingerprint(Arc<Inner>);

struct Inner {
    model: Model,
    signature: Signature,
    width: i32,
    height: i32,
    transformations: TransformationKeys,
    resource_type: ResourceType,
    transcode_type: ResourceType,
    options: Options,
    hash: u64,
}

impl Inner {
    fn fields_eq(&self, other: &Inner) -> bool {
        self.model == other.model
            && self.signature == other.signature
            && self.width == other.width
            && self.height == other.height
            && self.transformations == other.transformations
            && self.resource_type == other.resource_type
            && self.transcode_type == other.transcode_type
            && self.options == other.options
    }
}

impl Fingerprint {
    /// Starts building a fingerprint for `model`.
    pub fn builder(model: Model) -> FingerprintBuilder {
        FingerprintBuilder::new(model)
    }

    pub fn model(&self) -> &Model {
        &self.0.model
    }

    pub fn signature(&self) -> &Signature {
        &self.0.signature
    }

    pub fn width(&self) -> i32 {
        self.0.width
    }

    pub fn height(&self) -> i32 {
        self.0.height
    }

    pub fn transformations(&self) -> &TransformationKeys {
        &self.0.transformations
    }

    pub fn resource_type(&self) -> ResourceType {
        self.0.resource_type
    }

    pub fn transcode_type(&self) -> ResourceType {
        self.0.transcode_type
    }

    pub fn options(&self) -> &Options {
        &self.0.options
    }

    /// The precomputed hash of all fields.
    pub fn hash_code(&self) -> u64 {
        self.0.hash
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.hash == other.0.hash && self.0.fields_eq(&other.0))
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("model", &self.0.model)
            .field("width", &self.0.width)
            .field("height", &self.0.height)
            .field("resource_type", &self.0.resource_type)
            .field("transcode_type", &self.0.transcode_type)
            .field("signature", &self.0.signature)
            .field("hash", &format_args!("{:016x}", self.0.hash))
            .field("transformations", &self.0.transformations)
            .field("options", &self.0.options)
            .finish()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}x{}->{}#{:016x}",
            self.0.model,
            self.0.width,
            self.0.height,
            self.0.transcode_type.name(),
            self.0.hash
        )
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds and validates a [`Fingerprint`].
#[derive(Debug, Clone)]
pub struct FingerprintBuilder {
    model: Model,
    signature: Signature,
    width: i32,
    height: i32,
    transformations: TransformationKeys,
    resource_type: Option<ResourceType>,
    transcode_type: Option<ResourceType>,
    options: Options,
}

impl FingerprintBuilder {
    fn new(model: Model) -> Self {
        Self {
            model,
            signature: Signature::empty(),
            width: SIZE_ORIGINAL,
            height: SIZE_ORIGINAL,
            transformations: TransformationKeys::new(),
            resource_type: None,
            transcode_type: None,
            options: Options::new(),
        }
    }

    #[must_use]
    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    #[must_use]
    pub fn size(mut self, width: i32, height: i32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn transformations(mut self, transformations: TransformationKeys) -> Self {
        self.transformations = transformations;
        self
    }

    #[must_use]
    pub fn resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    #[must_use]
    pub fn transcode_type(mut self, transcode_type: ResourceType) -> Self {
        self.transcode_type = Some(transcode_type);
        self
    }

    #[must_use]
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Validates the fields and computes the hash.
    pub fn build(self) -> Result<Fingerprint, KeyError> {
        if self.model.is_empty() {
            return Err(KeyError::EmptyModel);
        }
        validate_dimension("width", self.width)?;
        validate_dimension("height", self.height)?;
        let resource_type = self
            .resource_type
            .ok_or(KeyError::MissingField("resource_type"))?;
        let transcode_type = self
            .transcode_type
            .ok_or(KeyError::MissingField("transcode_type"))?;

        let mut hasher = DefaultHasher::new();
        self.model.hash(&mut hasher);
        self.signature.hash(&mut hasher);
        self.width.hash(&mut hasher);
        self.height.hash(&mut hasher);
        self.transformations.hash(&mut hasher);
        resource_type.hash(&mut hasher);
        transcode_type.hash(&mut hasher);
        self.options.hash(&mut hasher);

        Ok(Fingerprint(Arc::new(Inner {
            model: self.model,
            signature: self.signature,
            width: self.width,
            height: self.height,
            transformations: self.transformations,
            resource_type,
            transcode_type,
            options: self.options,
            hash: hasher.finish(),
        })))
    }
}

fn validate_dimension(dimension: &'static str, value: i32) -> Result<(), KeyError> {
    if value > 0 || value == SIZE_ORIGINAL {
        Ok(())
    } else {
        Err(KeyError::InvalidDimension { dimension, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    struct Bitmap;
    struct Drawable;

    fn base_for(model: Model) -> FingerprintBuilder {
        let mut transformations = TransformationKeys::new();
        transformations.insert(ResourceType::of::<Bitmap>(), "center_crop");

        Fingerprint::builder(model)
            .signature(Signature::new("v1").unwrap())
            .size(200, 100)
            .transformations(transformations)
            .resource_type(ResourceType::of::<Bitmap>())
            .transcode_type(ResourceType::of::<Drawable>())
            .options(Options::new().with("upscale", false))
    }

    fn base() -> FingerprintBuilder {
        base_for(Model::url("https://example.com/a.png"))
    }

    #[test]
    fn test_equal_fields_equal_fingerprints() {
        let a = base().build().unwrap();
        let b = base().build().unwrap();

        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());

        let set: HashSet<_> = [a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert!(set.contains(&a));
    }

    #[rstest]
    #[case::model(base_for(Model::url("https://example.com/b.png")))]
    #[case::signature(base().signature(Signature::new("v2").unwrap()))]
    #[case::width(base().size(201, 100))]
    #[case::height(base().size(200, 101))]
    #[case::transformations(base().transformations(TransformationKeys::new()))]
    #[case::resource_type(base().resource_type(ResourceType::of::<Drawable>()))]
    #[case::transcode_type(base().transcode_type(ResourceType::of::<Bitmap>()))]
    #[case::options(base().options(Options::new().with("upscale", true)))]
    fn test_differing_field_unequal(#[case] changed: FingerprintBuilder) {
        let original = base().build().unwrap();
        let changed = changed.build().unwrap();
        assert_ne!(original, changed);
    }

    #[test]
    fn test_missing_types_rejected() {
        let err = Fingerprint::builder(Model::named("avatar"))
            .resource_type(ResourceType::of::<Bitmap>())
            .build()
            .unwrap_err();
        assert_eq!(err, KeyError::MissingField("transcode_type"));
        assert!(err.is_missing());
    }

    #[test]
    fn test_empty_model_rejected() {
        let err = Fingerprint::builder(Model::url(""))
            .resource_type(ResourceType::of::<Bitmap>())
            .transcode_type(ResourceType::of::<Bitmap>())
            .build()
            .unwrap_err();
        assert_eq!(err, KeyError::EmptyModel);
    }

    #[test]
    fn test_invalid_dimension_rejected() {
        let err = base().size(0, 100).build().unwrap_err();
        assert_eq!(
            err,
            KeyError::InvalidDimension {
                dimension: "width",
                value: 0
            }
        );

        assert!(base().size(SIZE_ORIGINAL, SIZE_ORIGINAL).build().is_ok());
    }
}
