//! Exact Matcher
//!
//! Deterministic utterance-to-intent lookup that runs before the statistical
//! classifier, so curated phrasings are never second-guessed by a model.

use std::collections::HashSet;

use bot_nlu_core::{IntentDefinition, Prediction};

use crate::normalization::normalize_utterance;

struct ExactEntry {
    /// Definition without utterances, kept for context checks
    intent: IntentDefinition,
    utterances: HashSet<String>,
}

/// Normalized utterance index, in intent definition order
pub struct ExactMatcher {
    entries: Vec<ExactEntry>,
}

impl ExactMatcher {
    /// Index the utterances of `intents`
    pub fn new(intents: &[IntentDefinition]) -> Self {
        let entries = intents
            .iter()
            .map(|intent| {
                let utterances = intent
                    .utterances
                    .iter()
                    .map(|u| normalize_utterance(u))
                    .filter(|u| !u.is_empty())
                    .collect();
                ExactEntry {
                    intent: IntentDefinition {
                        utterances: Vec::new(),
                        ..intent.clone()
                    },
                    utterances,
                }
            })
            .collect();

        Self { entries }
    }

    /// First intent, in definition order, with an utterance equal to `text`
    /// after normalization. Only intents in `active_contexts` are candidates;
    /// an empty context list disables the filter.
    pub fn exact_match(&self, text: &str, active_contexts: &[String]) -> Option<Prediction> {
        let normalized = normalize_utterance(text);
        if normalized.is_empty() {
            return None;
        }

        let entry = self.entries.iter().find(|entry| {
            entry.intent.in_contexts(active_contexts) && entry.utterances.contains(&normalized)
        })?;

        tracing::debug!(intent = %entry.intent.name, "Exact match");
        Some(
            Prediction::new(entry.intent.name.clone(), 1.0)
                .with_context(entry.intent.resolve_context(active_contexts)),
        )
    }

    /// Number of indexed intents
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
