//! Centralized defaults for the NLU core
//!
//! Single source of truth for tunables that have a default in settings and are
//! also referenced by tests and tooling.

/// Statistical classifier defaults
pub mod classifier {
    /// Candidates requested from the engine per prediction
    pub const DEFAULT_NUM_CANDIDATES: usize = 5;

    /// Confidence of the "none" sentinel returned when the engine yields no
    /// parseable prediction. Kept at its historical value.
    pub const NONE_CONFIDENCE: f32 = 0.9999;

    /// Training epochs passed to the external trainer
    pub const DEFAULT_EPOCHS: u32 = 25;

    /// Learning rate passed to the external trainer
    pub const DEFAULT_LEARNING_RATE: f32 = 0.5;

    /// Word n-gram length passed to the external trainer
    pub const DEFAULT_WORD_NGRAMS: u32 = 2;

    /// Laplace smoothing of the in-process model
    pub const DEFAULT_SMOOTHING: f32 = 1.0;

    /// External trainer executable looked up on `PATH`
    pub const DEFAULT_BINARY: &str = "fasttext";
}

/// Decision engine defaults
pub mod engine {
    /// Predictions below this confidence count as "no intent"
    pub const MIN_INTENT_CONFIDENCE: f32 = 0.5;

    /// Capacity of the engine event broadcast channel
    pub const EVENT_BUFFER: usize = 100;
}

/// Environment overrides
pub mod env {
    /// Prefix of environment variables overriding settings,
    /// e.g. `BOT_NLU__ENGINE__MIN_INTENT_CONFIDENCE=0.7`
    pub const PREFIX: &str = "BOT_NLU";

    /// Separator between nested keys
    pub const SEPARATOR: &str = "__";
}
