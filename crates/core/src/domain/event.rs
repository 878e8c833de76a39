//! Inbound events, conversation context and the merged evidence a turn is
//! resolved against

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ExtractedEntity, Prediction};
use crate::Language;

/// A user utterance addressed to a bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub bot_id: String,
    pub session_id: String,
    pub text: String,
    /// Language of the utterance; the bot's default language when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    /// Contexts activated by the channel for this event only
    #[serde(default)]
    pub contexts: Vec<String>,
    pub received_at: DateTime<Utc>,
}

impl IncomingEvent {
    pub fn new(
        bot_id: impl Into<String>,
        session_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            bot_id: bot_id.into(),
            session_id: session_id.into(),
            text: text.into(),
            language: None,
            contexts: Vec::new(),
            received_at: Utc::now(),
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn with_contexts<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contexts = contexts.into_iter().map(Into::into).collect();
        self
    }
}

/// Conversation state read from the external session store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Topic the conversation is currently on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_topic: Option<String>,
    /// Contexts active for the session
    #[serde(default)]
    pub active_contexts: Vec<String>,
    /// Session variables
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl ConversationContext {
    pub fn on_topic(topic: impl Into<String>) -> Self {
        Self {
            current_topic: Some(topic.into()),
            ..Default::default()
        }
    }

    /// Session contexts merged with the event's own contexts, without
    /// duplicates, session contexts first
    pub fn merged_contexts(&self, event_contexts: &[String]) -> Vec<String> {
        let mut merged = self.active_contexts.clone();
        for ctx in event_contexts {
            if !merged.contains(ctx) {
                merged.push(ctx.clone());
            }
        }
        merged
    }
}

/// What the NLU stages found in one utterance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Understanding {
    pub language: Language,
    /// Winning intent, absent when nothing cleared the confidence floor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Prediction>,
    /// All context-scoped predictions, descending confidence
    #[serde(default)]
    pub predictions: Vec<Prediction>,
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    /// Whether the intent came from the exact matcher
    #[serde(default)]
    pub exact_match: bool,
    /// Model that produced the predictions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

/// Everything conditions are evaluated against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub text: String,
    pub understanding: Understanding,
    pub context: ConversationContext,
    /// Contexts active for this turn
    pub active_contexts: Vec<String>,
}

impl Evidence {
    pub fn new(text: impl Into<String>, understanding: Understanding, context: ConversationContext) -> Self {
        let active_contexts = context.active_contexts.clone();
        Self {
            text: text.into(),
            understanding,
            context,
            active_contexts,
        }
    }

    pub fn intent(&self) -> Option<&Prediction> {
        self.understanding.intent.as_ref()
    }

    /// Confidence of the winning intent, 0 when there is none
    pub fn intent_confidence(&self) -> f32 {
        self.intent().map(|p| p.confidence).unwrap_or(0.0)
    }

    pub fn entities_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ExtractedEntity> {
        self.understanding.entities.iter().filter(move |e| e.name == name)
    }

    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.context.variables.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_contexts() {
        let ctx = ConversationContext {
            active_contexts: vec!["global".into(), "billing".into()],
            ..Default::default()
        };
        let merged = ctx.merged_contexts(&["billing".to_string(), "promo".to_string()]);
        assert_eq!(merged, vec!["global", "billing", "promo"]);
    }

    #[test]
    fn test_evidence_accessors() {
        let understanding = Understanding {
            intent: Some(Prediction::new("greet", 0.8)),
            ..Default::default()
        };
        let evidence = Evidence::new("hi", understanding, ConversationContext::default());

        assert_eq!(evidence.intent().map(|p| p.name.as_str()), Some("greet"));
        assert!((evidence.intent_confidence() - 0.8).abs() < f32::EPSILON);
        assert_eq!(evidence.entities_named("color").count(), 0);
    }
}
