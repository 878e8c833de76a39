//! Bot Definition Files
//!
//! A bot definition bundles what the external stores would normally serve:
//! intents, entities and topics. It is used by the CLI and by tests to drive
//! the core without a real backend.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use bot_nlu_core::{EntityDefinition, IntentDefinition, Language, NluError, Topic};

/// Bot definition loaded from YAML, TOML or JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotDefinition {
    pub bot_id: String,
    /// Languages models are trained for; the default language when empty
    #[serde(default)]
    pub languages: Vec<Language>,
    #[serde(default)]
    pub default_language: Language,
    #[serde(default)]
    pub intents: Vec<IntentDefinition>,
    #[serde(default)]
    pub entities: Vec<EntityDefinition>,
    /// Topics in registration order
    #[serde(default)]
    pub topics: Vec<Topic>,
}

impl BotDefinition {
    /// Empty definition for `bot_id`
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            languages: Vec::new(),
            default_language: Language::default(),
            intents: Vec::new(),
            entities: Vec::new(),
            topics: Vec::new(),
        }
    }

    /// Load from a file; the format follows the extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BotDefinitionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BotDefinitionError::FileNotFound(path.display().to_string(), e.to_string())
        })?;

        let definition: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| BotDefinitionError::ParseError(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| BotDefinitionError::ParseError(e.to_string()))?,
            _ => serde_yaml::from_str(&content)
                .map_err(|e| BotDefinitionError::ParseError(e.to_string()))?,
        };

        definition.validate()?;
        tracing::info!(
            bot_id = %definition.bot_id,
            intents = definition.intents.len(),
            entities = definition.entities.len(),
            topics = definition.topics.len(),
            "Loaded bot definition"
        );
        Ok(definition)
    }

    /// Parse YAML content
    pub fn from_yaml(content: &str) -> Result<Self, BotDefinitionError> {
        let definition: Self = serde_yaml::from_str(content)
            .map_err(|e| BotDefinitionError::ParseError(e.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Check naming invariants the core relies on
    pub fn validate(&self) -> Result<(), BotDefinitionError> {
        if self.bot_id.trim().is_empty() {
            return Err(BotDefinitionError::Invalid("bot_id must not be empty".into()));
        }

        check_unique("intent", self.intents.iter().map(|i| i.name.as_str()))?;
        check_unique("entity", self.entities.iter().map(|e| e.name.as_str()))?;
        check_unique("topic", self.topics.iter().map(|t| t.name.as_str()))?;

        if let Some(bad) = self.intents.iter().find(|i| i.name.chars().any(char::is_whitespace)) {
            return Err(BotDefinitionError::Invalid(format!(
                "intent name '{}' must not contain whitespace",
                bad.name
            )));
        }

        if !self.languages.is_empty() && !self.languages.contains(&self.default_language) {
            return Err(BotDefinitionError::Invalid(format!(
                "default language '{}' is not among the bot languages",
                self.default_language
            )));
        }

        Ok(())
    }

    /// Languages to train for
    pub fn languages(&self) -> Vec<Language> {
        if self.languages.is_empty() {
            vec![self.default_language.clone()]
        } else {
            self.languages.clone()
        }
    }

    pub fn get_intent(&self, name: &str) -> Option<&IntentDefinition> {
        self.intents.iter().find(|i| i.name == name)
    }

    pub fn get_topic(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name == name)
    }
}

fn check_unique<'a>(
    what: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), BotDefinitionError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(BotDefinitionError::Invalid(format!("duplicate {} '{}'", what, name)));
        }
    }
    Ok(())
}

/// Errors when loading a bot definition
#[derive(Debug)]
pub enum BotDefinitionError {
    FileNotFound(String, String),
    ParseError(String),
    Invalid(String),
}

impl std::fmt::Display for BotDefinitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileNotFound(path, err) => {
                write!(f, "Bot definition not found at {}: {}", path, err)
            }
            Self::ParseError(err) => write!(f, "Failed to parse bot definition: {}", err),
            Self::Invalid(err) => write!(f, "Invalid bot definition: {}", err),
        }
    }
}

impl std::error::Error for BotDefinitionError {}

impl From<BotDefinitionError> for NluError {
    fn from(err: BotDefinitionError) -> Self {
        NluError::Config(err.to_string())
    }
}
