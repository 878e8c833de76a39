//! Language codes
//!
//! Models are bound to exactly one language, so the code is normalized once
//! here and used as part of every training/model key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::NluError;

/// Lowercase ISO-639 style language code ("en", "fr", "pt-br")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Language(String);

impl Language {
    pub fn new(code: &str) -> Result<Self, NluError> {
        let code = code.trim().to_lowercase().replace('_', "-");
        let valid = !code.is_empty()
            && code.len() <= 8
            && code.chars().all(|c| c.is_ascii_alphabetic() || c == '-')
            && !code.starts_with('-')
            && !code.ends_with('-');
        if !valid {
            return Err(NluError::Config(format!("invalid language code '{}'", code)));
        }
        Ok(Self(code))
    }

    /// English, the default language of a bot without explicit configuration
    pub fn english() -> Self {
        Self("en".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::english()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Language {
    type Err = NluError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Language {
    type Error = NluError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Language> for String {
    fn from(lang: Language) -> Self {
        lang.0
    }
}
