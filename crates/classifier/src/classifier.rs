//! Intent Classifier
//!
//! One classifier per bot and language. The active model sits behind an
//! `Arc` that is swapped whole, so a prediction started against one model
//! finishes against it even if a newer model is installed meanwhile.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

use bot_nlu_config::ClassifierSettings;
use bot_nlu_core::{sort_predictions, IntentDefinition, Language, NluError, Prediction, Result};

use crate::backend::{ClassifierBackend, TrainedModel};
use crate::model_id::ModelId;
use crate::training_set::TrainingSet;

/// Trained model as produced by `train`, ready to be stored elsewhere
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub id: ModelId,
    pub language: Language,
    pub bytes: Vec<u8>,
}

/// Model currently answering predictions
pub struct ActiveModel {
    pub id: ModelId,
    pub loaded_at: DateTime<Utc>,
    model: Arc<dyn TrainedModel>,
}

/// Statistical intent classifier for one bot and language
pub struct IntentClassifier {
    bot_id: String,
    language: Language,
    backend: Arc<dyn ClassifierBackend>,
    settings: ClassifierSettings,
    active: RwLock<Option<Arc<ActiveModel>>>,
}

impl IntentClassifier {
    pub fn new(
        bot_id: impl Into<String>,
        language: Language,
        backend: Arc<dyn ClassifierBackend>,
        settings: ClassifierSettings,
    ) -> Self {
        Self {
            bot_id: bot_id.into(),
            language,
            backend,
            settings,
            active: RwLock::new(None),
        }
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Train on every utterance of `intents` and make the result active.
    ///
    /// Without an explicit id the model id is derived from the training data.
    /// On failure the previously active model stays in place.
    pub async fn train(
        &self,
        intents: &[IntentDefinition],
        model_id: Option<ModelId>,
    ) -> Result<ModelArtifact> {
        let set = TrainingSet::from_intents(intents)?;
        let id = model_id.unwrap_or_else(|| ModelId::derive(&self.language, &set));

        tracing::info!(
            bot_id = %self.bot_id,
            language = %self.language,
            model_id = %id,
            backend = self.backend.name(),
            examples = set.len(),
            "Training intent model"
        );

        // Removed on drop, including when the training future is cancelled
        let workdir = self.scratch_dir()?;
        let bytes = self.backend.train(&set, workdir.path()).await.map_err(|e| {
            tracing::warn!(bot_id = %self.bot_id, language = %self.language, error = %e, "Training failed");
            e
        })?;

        self.load_model(&bytes, id.clone()).await?;

        Ok(ModelArtifact {
            id,
            language: self.language.clone(),
            bytes,
        })
    }

    /// Load a previously trained artifact and make it active
    pub async fn load_model(&self, bytes: &[u8], model_id: ModelId) -> Result<()> {
        let model = self.backend.load(bytes).await.map_err(|e| {
            tracing::warn!(bot_id = %self.bot_id, model_id = %model_id, error = %e, "Model load failed");
            e
        })?;

        let next = Arc::new(ActiveModel {
            id: model_id.clone(),
            loaded_at: Utc::now(),
            model,
        });
        let previous = self.active.write().replace(next);

        tracing::info!(
            bot_id = %self.bot_id,
            language = %self.language,
            model_id = %model_id,
            previous = previous.as_ref().map(|p| p.id.as_str()).unwrap_or("-"),
            "Model loaded"
        );
        Ok(())
    }

    /// Up to `num_classes` predictions, descending confidence.
    ///
    /// Fails with `ModelNotLoaded` before any model is active. When the
    /// engine yields nothing usable a single `none` sentinel is returned.
    pub async fn predict(&self, text: &str, num_classes: usize) -> Result<Vec<Prediction>> {
        Ok(self.predict_with_model(text, num_classes).await?.0)
    }

    /// Like [`predict`](Self::predict), also returning the id of the model
    /// that produced the predictions
    pub async fn predict_with_model(
        &self,
        text: &str,
        num_classes: usize,
    ) -> Result<(Vec<Prediction>, ModelId)> {
        let active = self
            .active
            .read()
            .clone()
            .ok_or_else(|| NluError::model_not_loaded(&self.bot_id, self.language.as_str()))?;

        let k = if num_classes == 0 {
            self.settings.num_candidates
        } else {
            num_classes
        };

        let mut predictions = active.model.predict(text, k).await?;
        sort_predictions(&mut predictions);
        predictions.truncate(k);

        if predictions.is_empty() {
            tracing::debug!(bot_id = %self.bot_id, model_id = %active.id, "No usable prediction");
            return Ok((
                vec![Prediction::none(self.settings.none_confidence)],
                active.id.clone(),
            ));
        }

        tracing::debug!(
            bot_id = %self.bot_id,
            model_id = %active.id,
            intent = %predictions[0].name,
            confidence = predictions[0].confidence,
            "Predicted intent"
        );
        Ok((predictions, active.id.clone()))
    }

    /// Id of the active model
    pub fn current_model_id(&self) -> Option<ModelId> {
        self.active.read().as_ref().map(|m| m.id.clone())
    }

    /// Snapshot of the active model
    pub fn active_model(&self) -> Option<Arc<ActiveModel>> {
        self.active.read().clone()
    }

    pub fn has_model(&self) -> bool {
        self.active.read().is_some()
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("bot-nlu-train-");
        let dir = match &self.settings.scratch_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InProcessBackend;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(
            "bot",
            Language::english(),
            Arc::new(InProcessBackend::default()),
            ClassifierSettings::default(),
        )
    }

    fn intents() -> Vec<IntentDefinition> {
        vec![
            IntentDefinition::new("A").with_utterances(["foo"]),
            IntentDefinition::new("B").with_utterances(["bar"]),
        ]
    }

    #[tokio::test]
    async fn test_predict_before_training() {
        let err = classifier().predict("foo", 3).await.unwrap_err();
        assert!(matches!(err, NluError::ModelNotLoaded { .. }));
    }

    #[tokio::test]
    async fn test_train_then_predict() {
        let c = classifier();
        let artifact = c.train(&intents(), None).await.unwrap();

        assert_eq!(c.current_model_id(), Some(artifact.id.clone()));
        assert!(artifact.id.as_str().starts_with("en-"));

        let predictions = c.predict("foo", 2).await.unwrap();
        assert_eq!(predictions[0].name, "A");
        assert!(predictions[0].confidence > predictions[1].confidence);
    }

    #[tokio::test]
    async fn test_unknown_text_yields_sentinel() {
        let c = classifier();
        c.train(&intents(), None).await.unwrap();

        let predictions = c.predict("zzz", 5).await.unwrap();
        assert_eq!(predictions.len(), 1);
        assert!(predictions[0].is_none_intent());
        assert!((predictions[0].confidence - 0.9999).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_failed_train_keeps_previous_model() {
        let c = classifier();
        c.train(&intents(), Some(ModelId::new("v1"))).await.unwrap();

        let bad = vec![IntentDefinition::new("has space").with_utterances(["x"])];
        assert!(c.train(&bad, Some(ModelId::new("v2"))).await.is_err());

        assert_eq!(c.current_model_id(), Some(ModelId::new("v1")));
        assert_eq!(c.predict("bar", 1).await.unwrap()[0].name, "B");
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_model() {
        let c = classifier();
        c.train(&intents(), Some(ModelId::new("v1"))).await.unwrap();

        assert!(c.load_model(b"garbage", ModelId::new("v2")).await.is_err());
        assert_eq!(c.current_model_id(), Some(ModelId::new("v1")));
    }

    #[tokio::test]
    async fn test_load_artifact_into_other_classifier() {
        let trained = classifier();
        let artifact = trained.train(&intents(), None).await.unwrap();

        let fresh = classifier();
        fresh.load_model(&artifact.bytes, artifact.id.clone()).await.unwrap();
        assert_eq!(fresh.current_model_id(), Some(artifact.id));
        assert_eq!(fresh.predict("foo", 1).await.unwrap()[0].name, "A");
    }

    #[tokio::test]
    async fn test_snapshot_survives_swap() {
        let c = classifier();
        c.train(&intents(), Some(ModelId::new("v1"))).await.unwrap();
        let held = c.active_model().unwrap();

        let other = vec![IntentDefinition::new("C").with_utterances(["foo"])];
        c.train(&other, Some(ModelId::new("v2"))).await.unwrap();

        assert_eq!(held.id, ModelId::new("v1"));
        assert_eq!(held.model.predict("foo", 1).await.unwrap()[0].name, "A");
        assert_eq!(c.predict("foo", 1).await.unwrap()[0].name, "C");
    }

    /// Backend whose "old" model answers only once the gate opens
    struct GatedBackend {
        gate: Arc<tokio::sync::Notify>,
    }

    struct GatedModel {
        label: String,
        gate: Arc<tokio::sync::Notify>,
    }

    #[async_trait::async_trait]
    impl ClassifierBackend for GatedBackend {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn train(&self, _set: &crate::TrainingSet, _workdir: &std::path::Path) -> Result<Vec<u8>> {
            Ok(b"old".to_vec())
        }

        async fn load(&self, artifact: &[u8]) -> Result<Arc<dyn TrainedModel>> {
            Ok(Arc::new(GatedModel {
                label: String::from_utf8_lossy(artifact).into_owned(),
                gate: self.gate.clone(),
            }))
        }
    }

    #[async_trait::async_trait]
    impl TrainedModel for GatedModel {
        async fn predict(&self, _text: &str, _k: usize) -> Result<Vec<Prediction>> {
            if self.label == "old" {
                self.gate.notified().await;
            }
            Ok(vec![Prediction::new(self.label.clone(), 0.9)])
        }
    }

    #[tokio::test]
    async fn test_prediction_names_the_model_that_served_it() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let c = Arc::new(IntentClassifier::new(
            "bot",
            Language::english(),
            Arc::new(GatedBackend { gate: gate.clone() }),
            ClassifierSettings::default(),
        ));
        c.load_model(b"old", ModelId::new("v1")).await.unwrap();

        let pending = tokio::spawn({
            let c = c.clone();
            async move { c.predict_with_model("x", 1).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        c.load_model(b"new", ModelId::new("v2")).await.unwrap();
        gate.notify_one();

        let (predictions, id) = pending.await.unwrap().unwrap();
        assert_eq!(id, ModelId::new("v1"));
        assert_eq!(predictions[0].name, "old");
        assert_eq!(c.current_model_id(), Some(ModelId::new("v2")));
    }
}
