//! Error types for the NLU core
//!
//! Every error here is recoverable at the call boundary. None of them should
//! ever take down the host process.

use thiserror::Error;

/// Errors raised by the NLU and decision core
#[derive(Debug, Error)]
pub enum NluError {
    /// `predict` was called before any model was trained or loaded
    #[error("no model loaded for bot '{bot_id}' ({language})")]
    ModelNotLoaded { bot_id: String, language: String },

    /// The training routine (in-process or external binary) failed
    #[error("training failed: {0}")]
    TrainingFailed(String),

    /// The training job was cancelled before it completed
    #[error("training cancelled")]
    TrainingCancelled,

    /// A training job for the same bot and language is already running
    #[error("training already in progress for bot '{bot_id}' ({language})")]
    TrainingInProgress { bot_id: String, language: String },

    /// An entity's regular expression failed to compile
    #[error("malformed pattern for entity '{entity}': {reason}")]
    MalformedPattern { entity: String, reason: String },

    /// A topic condition failed while being evaluated
    #[error("condition '{kind}' failed: {reason}")]
    ConditionEvaluation { kind: String, reason: String },

    /// A topic references a condition kind nobody registered
    #[error("unknown condition kind: {0}")]
    UnknownCondition(String),

    /// No runtime is mounted for the bot
    #[error("bot '{0}' is not mounted")]
    BotNotMounted(String),

    /// An external collaborator store failed
    #[error("store error: {0}")]
    Store(String),

    /// Model artifact or payload (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid settings
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NluError {
    /// Shorthand for a `ModelNotLoaded` error
    pub fn model_not_loaded(bot_id: impl Into<String>, language: impl Into<String>) -> Self {
        Self::ModelNotLoaded {
            bot_id: bot_id.into(),
            language: language.into(),
        }
    }

    /// Whether a failed prediction should degrade to "no intent" instead of
    /// aborting the turn
    pub fn is_degradable(&self) -> bool {
        !matches!(self, Self::BotNotMounted(_) | Self::Config(_))
    }
}

impl From<serde_json::Error> for NluError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, NluError>;
