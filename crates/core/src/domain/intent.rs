//! Intent definitions and predictions

use serde::{Deserialize, Serialize};

/// Name of the sentinel intent returned when the classifier has nothing to say
pub const NONE_INTENT: &str = "none";

/// Slot declared by an intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDefinition {
    /// Slot name
    pub name: String,
    /// Entity names that can fill this slot
    #[serde(default)]
    pub entities: Vec<String>,
}

/// Intent authored for a bot
///
/// Loaded read-only for a training run; the exact matcher and the classifier
/// never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDefinition {
    /// Intent name, also used as the classifier label
    pub name: String,
    /// Contexts this intent belongs to
    #[serde(default)]
    pub contexts: Vec<String>,
    /// Example utterances
    #[serde(default)]
    pub utterances: Vec<String>,
    /// Declared slots
    #[serde(default)]
    pub slots: Vec<SlotDefinition>,
}

impl IntentDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contexts: Vec::new(),
            utterances: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub fn with_contexts<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contexts = contexts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_utterances<I, S>(mut self, utterances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.utterances = utterances.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this intent is a candidate for the given active contexts.
    ///
    /// An empty `active` set means no filtering.
    pub fn in_contexts(&self, active: &[String]) -> bool {
        active.is_empty() || self.contexts.iter().any(|c| active.contains(c))
    }

    /// The context a prediction for this intent resolves to: the first
    /// declared context that is active, falling back to the first declared one
    pub fn resolve_context(&self, active: &[String]) -> Option<String> {
        self.contexts
            .iter()
            .find(|c| active.contains(c))
            .or_else(|| self.contexts.first())
            .cloned()
    }
}

/// One intent prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Intent name
    pub name: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Context the intent was resolved in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Prediction {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    /// Sentinel returned when the engine produced no parseable prediction
    pub fn none(confidence: f32) -> Self {
        Self::new(NONE_INTENT, confidence)
    }

    /// Whether this is the "none" sentinel
    pub fn is_none_intent(&self) -> bool {
        self.name == NONE_INTENT
    }
}

/// Sort predictions by descending confidence; ties keep their input order
pub fn sort_predictions(predictions: &mut [Prediction]) {
    predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}
