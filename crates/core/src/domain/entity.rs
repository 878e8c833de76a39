//! Entity definitions and extracted entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical value of a list entity with its synonyms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityOccurrence {
    /// Canonical value reported for every match
    pub name: String,
    /// Alternative spellings that map to `name`
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl EntityOccurrence {
    pub fn new<I, S>(name: impl Into<String>, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            synonyms: synonyms.into_iter().map(Into::into).collect(),
        }
    }

    /// Canonical value followed by all synonyms
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.synonyms.iter().map(|s| s.as_str()))
    }
}

/// How an entity is recognized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    /// Regular-expression entity
    Pattern {
        pattern: String,
        #[serde(default)]
        case_sensitive: bool,
        /// Author-provided samples, informational only
        #[serde(default)]
        examples: Vec<String>,
    },
    /// Closed list of canonical values with synonyms
    List {
        #[serde(default)]
        occurrences: Vec<EntityOccurrence>,
    },
}

/// Entity authored for a bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    #[serde(flatten)]
    pub kind: EntityKind,
}

impl EntityDefinition {
    pub fn pattern(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Pattern {
                pattern: pattern.into(),
                case_sensitive: false,
                examples: Vec::new(),
            },
        }
    }

    pub fn list(name: impl Into<String>, occurrences: Vec<EntityOccurrence>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::List { occurrences },
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self.kind {
            EntityKind::Pattern { .. } => EntityType::Pattern,
            EntityKind::List { .. } => EntityType::List,
        }
    }
}

/// Entity type tag carried by extraction results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Pattern,
    List,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern => f.write_str("pattern"),
            Self::List => f.write_str("list"),
        }
    }
}

/// Entity located in an utterance.
///
/// `start..end` are character offsets into the original input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// Entity definition name
    pub name: String,
    /// Definition type
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Matched substring of the input
    pub source: String,
    /// Start character offset (inclusive)
    pub start: usize,
    /// End character offset (exclusive)
    pub end: usize,
    /// 1.0 for deterministic matches
    pub confidence: f32,
    /// Canonical value; the matched text for pattern entities
    pub value: String,
}

impl ExtractedEntity {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
