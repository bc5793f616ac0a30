//! The opaque model a request loads from.

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;

/// What a request wants loaded.
///
/// The engine never interprets a model itself; model loaders registered with
/// the engine decide which models they can handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Model {
    /// A file on the local filesystem.
    Path(PathBuf),
    /// A remote URL.
    Url(String),
    /// Raw bytes already in memory.
    Bytes(Bytes),
    /// An application-defined identifier.
    Named(String),
}

/// Discriminant of a [`Model`], used to select model loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelKind {
    Path,
    Url,
    Bytes,
    Named,
}

impl Model {
    /// Creates a path model.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Creates a URL model.
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Creates a named model.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Returns the kind of this model.
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::Path(_) => ModelKind::Path,
            Model::Url(_) => ModelKind::Url,
            Model::Bytes(_) => ModelKind::Bytes,
            Model::Named(_) => ModelKind::Named,
        }
    }

    /// Returns the path if this is a path model.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Model::Path(path) => Some(path),
            _ => None,
        }
    }

    /// Returns true if the model carries no identity at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Model::Path(path) => path.as_os_str().is_empty(),
            Model::Url(url) => url.is_empty(),
            Model::Bytes(_) => false,
            Model::Named(name) => name.is_empty(),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Path(path) => write!(f, "{}", path.display()),
            Model::Url(url) => f.write_str(url),
            Model::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Model::Named(name) => f.write_str(name),
        }
    }
}
