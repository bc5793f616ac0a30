use std::sync::Arc;

use tierload_key::{DataType, Model, ModelKind, ResourceType};

use super::loaders::{BytesDecoder, BytesLoader, FileLoader, HttpLoader};
use super::{
    DecodeOptions, FetchedData, ModelLoader, ResourceDecoder, ResourceTranscoder, Transformation,
};
use crate::engine::Payload;
use crate::error::DecodeError;

/// Ordered lists of model loaders, decoders and transcoders.
///
/// Lookups return candidates in registration order; callers take the first
/// one that works.
pub struct Registry {
    loaders: Vec<(ModelKind, Arc<dyn ModelLoader>)>,
    decoders: Vec<Arc<dyn ResourceDecoder>>,
    transcoders: Vec<Arc<dyn ResourceTranscoder>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Loaders registered for the model's kind that claim to handle it.
    pub fn model_loaders(&self, model: &Model) -> Vec<Arc<dyn ModelLoader>> {
        let kind = model.kind();
        self.loaders
            .iter()
            .filter(|(k, loader)| *k == kind && loader.handles(model))
            .map(|(_, loader)| loader.clone())
            .collect()
    }

    /// Whether data of `data_type` can be decoded into `resource_type` and
    /// then transcoded into `transcode_type`.
    pub fn has_load_path(
        &self,
        data_type: DataType,
        resource_type: ResourceType,
        transcode_type: ResourceType,
    ) -> bool {
        let decodable = self
            .decoders
            .iter()
            .any(|d| d.data_type() == data_type && d.resource_type() == resource_type);
        decodable
            && (resource_type == transcode_type
                || self.transcoder(resource_type, transcode_type).is_some())
    }

    /// Runs the full decode path: decode, transform, transcode.
    pub fn decode(
        &self,
        data: FetchedData,
        resource_type: ResourceType,
        transcode_type: ResourceType,
        transformation: Option<&Arc<dyn Transformation>>,
        options: &DecodeOptions<'_>,
    ) -> Result<Payload, DecodeError> {
        let data_type = data.data_type();
        let decoder = self
            .decoders
            .iter()
            .find(|d| {
                d.data_type() == data_type
                    && d.resource_type() == resource_type
                    && d.handles(&data, options.options)
            })
            .ok_or(DecodeError::NoDecodePath {
                data: data_type,
                resource: resource_type,
            })?;

        let decoded = decoder.decode(data, options)?;
        if decoded.resource_type() != resource_type {
            return Err(DecodeError::UnexpectedType {
                expected: resource_type,
                actual: decoded.resource_type(),
            });
        }

        let transformed = match transformation {
            Some(t) => t.transform(decoded, options.width, options.height)?,
            None => decoded,
        };

        if resource_type == transcode_type {
            return Ok(transformed);
        }

        let transcoder =
            self.transcoder(resource_type, transcode_type)
                .ok_or(DecodeError::NoTranscoder {
                    from: resource_type,
                    to: transcode_type,
                })?;
        transcoder.transcode(transformed, options.options)
    }

    fn transcoder(
        &self,
        from: ResourceType,
        to: ResourceType,
    ) -> Option<&Arc<dyn ResourceTranscoder>> {
        self.transcoders
            .iter()
            .find(|t| t.from_type() == from && t.to_type() == to)
    }
}

/// Builder for [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    loaders: Vec<(ModelKind, Arc<dyn ModelLoader>)>,
    decoders: Vec<Arc<dyn ResourceDecoder>>,
    transcoders: Vec<Arc<dyn ResourceTranscoder>>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn append_loader(mut self, kind: ModelKind, loader: Arc<dyn ModelLoader>) -> Self {
        self.loaders.push((kind, loader));
        self
    }

    #[must_use]
    pub fn append_decoder(mut self, decoder: Arc<dyn ResourceDecoder>) -> Self {
        self.decoders.push(decoder);
        self
    }

    #[must_use]
    pub fn append_transcoder(mut self, transcoder: Arc<dyn ResourceTranscoder>) -> Self {
        self.transcoders.push(transcoder);
        self
    }

    /// Registers the file, HTTP and in-memory loaders plus the raw bytes
    /// decoder.
    #[must_use]
    pub fn with_defaults(self, client: reqwest::Client) -> Self {
        self.append_loader(ModelKind::Path, Arc::new(FileLoader))
            .append_loader(ModelKind::Url, Arc::new(HttpLoader::new(client)))
            .append_loader(ModelKind::Bytes, Arc::new(BytesLoader))
            .append_decoder(Arc::new(BytesDecoder))
    }

    pub fn build(self) -> Registry {
        Registry {
            loaders: self.loaders,
            decoders: self.decoders,
            transcoders: self.transcoders,
        }
    }
}
