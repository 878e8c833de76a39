//! In-process multinomial naive Bayes
//!
//! Bag-of-words over lowercased Unicode words, Laplace smoothing, softmax over
//! the class log-posteriors. Small and deterministic; no external binary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

use bot_nlu_core::{NluError, Prediction, Result};

use super::{ClassifierBackend, TrainedModel};
use crate::training_set::TrainingSet;

/// Artifact format version
const FORMAT_VERSION: u32 = 1;

/// Naive Bayes backend
#[derive(Debug, Clone)]
pub struct InProcessBackend {
    smoothing: f32,
}

impl InProcessBackend {
    pub fn new(smoothing: f32) -> Self {
        Self {
            smoothing: if smoothing > 0.0 { smoothing } else { 1.0 },
        }
    }
}

impl Default for InProcessBackend {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl ClassifierBackend for InProcessBackend {
    fn name(&self) -> &'static str {
        "in_process"
    }

    async fn train(&self, set: &TrainingSet, _workdir: &Path) -> Result<Vec<u8>> {
        let set = set.clone();
        let smoothing = self.smoothing;

        let model = tokio::task::spawn_blocking(move || NaiveBayes::fit(&set, smoothing))
            .await
            .map_err(|e| NluError::TrainingFailed(format!("training task failed: {}", e)))??;

        tracing::debug!(
            labels = model.labels.len(),
            vocabulary = model.vocabulary.len(),
            "Trained naive Bayes model"
        );
        Ok(serde_json::to_vec(&model)?)
    }

    async fn load(&self, artifact: &[u8]) -> Result<Arc<dyn TrainedModel>> {
        let model: NaiveBayes = serde_json::from_slice(artifact)?;
        model.check()?;
        Ok(Arc::new(model))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NaiveBayes {
    version: u32,
    labels: Vec<String>,
    vocabulary: HashMap<String, usize>,
    /// log P(label)
    log_priors: Vec<f32>,
    /// log P(token | label), row-major `[label][token]`
    log_likelihoods: Vec<f32>,
}

impl NaiveBayes {
    fn fit(set: &TrainingSet, alpha: f32) -> Result<Self> {
        let labels: Vec<String> = set.labels().into_iter().map(String::from).collect();
        if labels.is_empty() {
            return Err(NluError::TrainingFailed("no labels to train on".into()));
        }
        let label_index: HashMap<&str, usize> =
            labels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();

        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let documents: Vec<(usize, Vec<String>)> = set
            .examples()
            .iter()
            .map(|example| (label_index[example.label.as_str()], tokenize(&example.text)))
            .collect();
        for (_, tokens) in &documents {
            for token in tokens {
                let next = vocabulary.len();
                vocabulary.entry(token.clone()).or_insert(next);
            }
        }

        let classes = labels.len();
        let vocab_size = vocabulary.len().max(1);
        let mut doc_counts = vec![0u32; classes];
        let mut token_counts = vec![0u32; classes * vocab_size];
        let mut token_totals = vec![0u32; classes];

        for (class, tokens) in &documents {
            doc_counts[*class] += 1;
            for token in tokens {
                if let Some(&t) = vocabulary.get(token) {
                    token_counts[class * vocab_size + t] += 1;
                    token_totals[*class] += 1;
                }
            }
        }

        let total_docs = documents.len() as f32;
        let log_priors = doc_counts
            .iter()
            .map(|&count| ((count as f32 + alpha) / (total_docs + alpha * classes as f32)).ln())
            .collect();

        let mut log_likelihoods = vec![0f32; classes * vocab_size];
        for class in 0..classes {
            let denominator = token_totals[class] as f32 + alpha * vocab_size as f32;
            for t in 0..vocab_size {
                let count = token_counts[class * vocab_size + t] as f32;
                log_likelihoods[class * vocab_size + t] = ((count + alpha) / denominator).ln();
            }
        }

        Ok(Self {
            version: FORMAT_VERSION,
            labels,
            vocabulary,
            log_priors,
            log_likelihoods,
        })
    }

    fn vocab_size(&self) -> usize {
        self.vocabulary.len().max(1)
    }

    /// Reject artifacts whose tables do not line up
    fn check(&self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(NluError::Serialization(format!(
                "unsupported model format version {}",
                self.version
            )));
        }
        let classes = self.labels.len();
        if classes == 0
            || self.log_priors.len() != classes
            || self.log_likelihoods.len() != classes * self.vocab_size()
            || self.vocabulary.values().any(|&t| t >= self.vocab_size())
        {
            return Err(NluError::Serialization("inconsistent model tables".into()));
        }
        Ok(())
    }

    fn scores(&self, text: &str) -> Option<Vec<f32>> {
        let vocab_size = self.vocab_size();
        let mut scores = self.log_priors.clone();
        let mut known = false;

        for token in tokenize(text) {
            if let Some(&t) = self.vocabulary.get(&token) {
                known = true;
                for (class, score) in scores.iter_mut().enumerate() {
                    *score += self.log_likelihoods[class * vocab_size + t];
                }
            }
        }

        // Nothing in vocabulary: there is no evidence to rank on
        known.then_some(scores)
    }
}

#[async_trait]
impl TrainedModel for NaiveBayes {
    async fn predict(&self, text: &str, k: usize) -> Result<Vec<Prediction>> {
        let Some(scores) = self.scores(text) else {
            return Ok(Vec::new());
        };

        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exp: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
        let sum: f32 = exp.iter().sum();

        let mut predictions: Vec<Prediction> = self
            .labels
            .iter()
            .zip(exp)
            .map(|(label, e)| Prediction::new(label.clone(), e / sum))
            .collect();
        bot_nlu_core::sort_predictions(&mut predictions);
        predictions.truncate(k);
        Ok(predictions)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bot_nlu_core::IntentDefinition;

    fn set() -> TrainingSet {
        TrainingSet::from_intents(&[
            IntentDefinition::new("A").with_utterances(["foo"]),
            IntentDefinition::new("B").with_utterances(["bar"]),
        ])
        .unwrap()
    }

    async fn trained() -> Arc<dyn TrainedModel> {
        let backend = InProcessBackend::default();
        let artifact = backend.train(&set(), Path::new(".")).await.unwrap();
        backend.load(&artifact).await.unwrap()
    }

    #[tokio::test]
    async fn test_predicts_trained_label() {
        let model = trained().await;
        let predictions = model.predict("foo", 5).await.unwrap();

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].name, "A");
        assert!(predictions[0].confidence > predictions[1].confidence);

        let total: f32 = predictions.iter().map(|p| p.confidence).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_case_insensitive_tokens() {
        let model = trained().await;
        let predictions = model.predict("BAR!", 1).await.unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].name, "B");
    }

    #[tokio::test]
    async fn test_unknown_words_yield_nothing() {
        let model = trained().await;
        assert!(model.predict("qux quux", 5).await.unwrap().is_empty());
        assert!(model.predict("", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_artifact_rejected() {
        let backend = InProcessBackend::default();
        assert!(matches!(
            backend.load(b"not json").await,
            Err(NluError::Serialization(_))
        ));

        let mut model = NaiveBayes::fit(&set(), 1.0).unwrap();
        model.log_priors.pop();
        let bytes = serde_json::to_vec(&model).unwrap();
        assert!(backend.load(&bytes).await.is_err());
    }
}
