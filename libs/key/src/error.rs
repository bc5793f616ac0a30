//! Error types for key construction.

use thiserror::Error;

/// Errors that can occur when building keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A string key was empty.
    #[error("{kind} key cannot be empty")]
    Empty { kind: &'static str },

    /// The model carried no usable identity.
    #[error("model cannot be empty")]
    EmptyModel,

    /// A dimension was neither positive nor `SIZE_ORIGINAL`.
    #[error("invalid {dimension}: {value} (must be > 0 or SIZE_ORIGINAL)")]
    InvalidDimension { dimension: &'static str, value: i32 },

    /// A required field was not set on the builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl KeyError {
    /// Returns true if this error is a missing or empty required field.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            KeyError::Empty { .. } | KeyError::EmptyModel | KeyError::MissingField(_)
        )
    }
}
