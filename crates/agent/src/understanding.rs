//! Utterance understanding
//!
//! Compiled per-bot NLU state: exact matcher, entities and the intent
//! definitions used to scope predictions by context. Rebuilt whole on a
//! definition change and swapped in as one `Arc`.

use bot_nlu_classifier::IntentClassifier;
use bot_nlu_config::EngineSettings;
use bot_nlu_core::{
    sort_predictions, EntityDefinition, IntentDefinition, Language, NluError, Prediction,
    Understanding,
};
use bot_nlu_text_processing::{CompiledEntities, ExactMatcher};

/// Compiled definitions of one bot
pub struct NluPipeline {
    intents: Vec<IntentDefinition>,
    matcher: ExactMatcher,
    entities: CompiledEntities,
}

impl NluPipeline {
    pub fn build(intents: Vec<IntentDefinition>, entities: &[EntityDefinition]) -> Self {
        let matcher = ExactMatcher::new(&intents);
        let entities = CompiledEntities::compile(entities);
        Self {
            intents,
            matcher,
            entities,
        }
    }

    pub fn intents(&self) -> &[IntentDefinition] {
        &self.intents
    }

    /// Entity definitions that failed to compile
    pub fn skipped_entities(&self) -> &[NluError] {
        self.entities.skipped()
    }

    /// Run the NLU stages on one utterance.
    ///
    /// The exact matcher short-circuits the classifier. Entity extraction
    /// runs either way. A failed prediction degrades to no intent.
    pub async fn understand(
        &self,
        text: &str,
        language: &Language,
        active_contexts: &[String],
        classifier: Option<&IntentClassifier>,
        settings: &EngineSettings,
        num_candidates: usize,
    ) -> Understanding {
        if settings.exact_match {
            if let Some(prediction) = self.matcher.exact_match(text, active_contexts) {
                return Understanding {
                    language: language.clone(),
                    intent: Some(prediction.clone()),
                    predictions: vec![prediction],
                    entities: self.entities.extract(text),
                    exact_match: true,
                    model_id: None,
                };
            }
        }

        let extract = async { self.entities.extract(text) };
        let classify = async {
            match classifier {
                Some(classifier) => Some(classifier.predict_with_model(text, num_candidates).await),
                None => None,
            }
        };
        let (entities, classified) = tokio::join!(extract, classify);

        let (predictions, model_id) = match classified {
            Some(Ok((predictions, model_id))) => {
                (self.scope(predictions, active_contexts), Some(model_id))
            }
            Some(Err(e)) => {
                metrics::counter!("bot_nlu_degraded_predictions_total").increment(1);
                tracing::warn!(language = %language, error = %e, "Prediction failed, no intent this turn");
                (Vec::new(), None)
            }
            None => (Vec::new(), None),
        };

        let intent = predictions
            .first()
            .filter(|p| !p.is_none_intent() && p.confidence >= settings.min_intent_confidence)
            .cloned();

        Understanding {
            language: language.clone(),
            intent,
            predictions,
            entities,
            exact_match: false,
            model_id: model_id.map(|id| id.to_string()),
        }
    }

    /// Keep predictions for intents active in `active_contexts`, tagging
    /// each with its resolved context
    fn scope(&self, predictions: Vec<Prediction>, active_contexts: &[String]) -> Vec<Prediction> {
        let mut scoped: Vec<Prediction> = predictions
            .into_iter()
            .filter_map(|prediction| {
                if prediction.is_none_intent() {
                    return Some(prediction);
                }
                let intent = self.intents.iter().find(|i| i.name == prediction.name)?;
                if !intent.in_contexts(active_contexts) {
                    return None;
                }
                let context = intent.resolve_context(active_contexts);
                Some(prediction.with_context(context))
            })
            .collect();
        sort_predictions(&mut scoped);
        scoped
    }
}
