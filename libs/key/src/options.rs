//! Order-independent option and transformation maps.

use std::collections::BTreeMap;
use std::fmt;

use crate::ResourceType;

/// A single option value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Key-value settings passed through to loaders and decoders.
///
/// Backed by a sorted map, so insertion order never affects equality or hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Options(BTreeMap<String, OptionValue>);

impl Options {
    /// Creates an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option, returning the updated set.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets an option in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Gets an option.
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    /// Gets a boolean option, if present and boolean.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(OptionValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

/// Identity of the transformations a request applies, per resource type.
///
/// Only the transformation identifiers participate in keys; the transformation
/// implementations live with the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TransformationKeys(BTreeMap<ResourceType, String>);

impl TransformationKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the transformation id applied to `resource_type`.
    pub fn insert(&mut self, resource_type: ResourceType, id: impl Into<String>) {
        self.0.insert(resource_type, id.into());
    }

    pub fn get(&self, resource_type: &ResourceType) -> Option<&str> {
        self.0.get(resource_type).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(ResourceType, String)> for TransformationKeys {
    fn from_iter<I: IntoIterator<Item = (ResourceType, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
