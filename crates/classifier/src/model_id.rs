//! Model identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

use bot_nlu_core::Language;

use crate::training_set::TrainingSet;

/// Identifies a trained model artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Content-derived id, `<lang>-<hex16>`. Identical training data in the
    /// same language always yields the same id.
    pub fn derive(language: &Language, set: &TrainingSet) -> Self {
        let hash = blake3::hash(set.render().as_bytes());
        let hex = hash.to_hex();
        Self(format!("{}-{}", language, &hex.as_str()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ModelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
