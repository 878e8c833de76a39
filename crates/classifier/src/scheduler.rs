//! Training Scheduler
//!
//! Runs training as background tasks keyed by (bot, language). At most one
//! job per key: a second submission is rejected, never queued. Cancelling a
//! job drops its training future, which removes its scratch directory and
//! kills any external trainer, and leaves the active model untouched.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use bot_nlu_core::{IntentDefinition, Language, NluError, Result};

use crate::classifier::{IntentClassifier, ModelArtifact};
use crate::model_id::ModelId;

/// (bot id, language)
pub type TrainingKey = (String, Language);

struct RunningJob {
    id: Uuid,
    started_at: DateTime<Utc>,
    cancel: oneshot::Sender<()>,
}

/// Handle to a submitted training job
pub struct TrainingHandle {
    pub job_id: Uuid,
    task: JoinHandle<Result<ModelArtifact>>,
}

impl TrainingHandle {
    /// Wait for the job to finish
    pub async fn wait(self) -> Result<ModelArtifact> {
        self.task
            .await
            .map_err(|e| NluError::TrainingFailed(format!("training task aborted: {}", e)))?
    }
}

/// Background training jobs of every mounted bot
#[derive(Default, Clone)]
pub struct TrainingScheduler {
    jobs: Arc<DashMap<TrainingKey, RunningJob>>,
}

impl TrainingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start training `classifier` in the background.
    ///
    /// Fails with `TrainingInProgress` if a job for the same bot and
    /// language is still running.
    pub fn submit(
        &self,
        classifier: Arc<IntentClassifier>,
        intents: Vec<IntentDefinition>,
        model_id: Option<ModelId>,
    ) -> Result<TrainingHandle> {
        let key: TrainingKey = (classifier.bot_id().to_string(), classifier.language().clone());
        let job_id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        match self.jobs.entry(key.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(bot_id = %key.0, language = %key.1, "Training already running");
                return Err(NluError::TrainingInProgress {
                    bot_id: key.0,
                    language: key.1.to_string(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(RunningJob {
                    id: job_id,
                    started_at: Utc::now(),
                    cancel: cancel_tx,
                });
            }
        }

        tracing::info!(bot_id = %key.0, language = %key.1, job_id = %job_id, "Training job started");

        let jobs = Arc::clone(&self.jobs);
        let task = tokio::spawn(async move {
            let result = tokio::select! {
                result = classifier.train(&intents, model_id) => result,
                _ = cancel_rx => Err(NluError::TrainingCancelled),
            };

            // A cancelled job may already have been replaced by a new one
            jobs.remove_if(&key, |_, job| job.id == job_id);

            match &result {
                Ok(artifact) => tracing::info!(
                    bot_id = %key.0,
                    language = %key.1,
                    job_id = %job_id,
                    model_id = %artifact.id,
                    "Training job finished"
                ),
                Err(e) => tracing::warn!(
                    bot_id = %key.0,
                    language = %key.1,
                    job_id = %job_id,
                    error = %e,
                    "Training job ended without a model"
                ),
            }
            result
        });

        Ok(TrainingHandle { job_id, task })
    }

    /// Cancel the job for a bot and language; `false` if none was running
    pub fn cancel(&self, bot_id: &str, language: &Language) -> bool {
        let key = (bot_id.to_string(), language.clone());
        match self.jobs.remove(&key) {
            Some((_, job)) => {
                tracing::info!(
                    bot_id,
                    language = %language,
                    job_id = %job.id,
                    running_ms = (Utc::now() - job.started_at).num_milliseconds(),
                    "Cancelling training job"
                );
                let _ = job.cancel.send(());
                true
            }
            None => false,
        }
    }

    /// Cancel every job of a bot, returning how many were cancelled
    pub fn cancel_bot(&self, bot_id: &str) -> usize {
        let languages: Vec<Language> = self
            .jobs
            .iter()
            .filter(|entry| entry.key().0 == bot_id)
            .map(|entry| entry.key().1.clone())
            .collect();

        languages
            .iter()
            .filter(|language| self.cancel(bot_id, language))
            .count()
    }

    pub fn is_training(&self, bot_id: &str, language: &Language) -> bool {
        self.jobs.contains_key(&(bot_id.to_string(), language.clone()))
    }

    /// Number of running jobs
    pub fn running(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ClassifierBackend, InProcessBackend, TrainedModel};
    use crate::training_set::TrainingSet;
    use async_trait::async_trait;
    use bot_nlu_config::ClassifierSettings;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    /// Delegates to the in-process backend after a delay, recording the
    /// scratch directory it was given
    struct SlowBackend {
        inner: InProcessBackend,
        delay: Duration,
        workdir: parking_lot::Mutex<Option<PathBuf>>,
    }

    #[async_trait]
    impl ClassifierBackend for SlowBackend {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn train(&self, set: &TrainingSet, workdir: &Path) -> Result<Vec<u8>> {
            *self.workdir.lock() = Some(workdir.to_path_buf());
            tokio::time::sleep(self.delay).await;
            self.inner.train(set, workdir).await
        }

        async fn load(&self, artifact: &[u8]) -> Result<Arc<dyn TrainedModel>> {
            self.inner.load(artifact).await
        }
    }

    fn slow_classifier(delay: Duration) -> (Arc<IntentClassifier>, Arc<SlowBackend>) {
        let backend = Arc::new(SlowBackend {
            inner: InProcessBackend::default(),
            delay,
            workdir: parking_lot::Mutex::new(None),
        });
        let classifier = Arc::new(IntentClassifier::new(
            "bot",
            Language::english(),
            backend.clone(),
            ClassifierSettings::default(),
        ));
        (classifier, backend)
    }

    fn intents() -> Vec<IntentDefinition> {
        vec![
            IntentDefinition::new("A").with_utterances(["foo"]),
            IntentDefinition::new("B").with_utterances(["bar"]),
        ]
    }

    #[tokio::test]
    async fn test_second_job_rejected() {
        let scheduler = TrainingScheduler::new();
        let (classifier, _) = slow_classifier(Duration::from_millis(200));

        let first = scheduler
            .submit(classifier.clone(), intents(), None)
            .unwrap();
        let second = scheduler.submit(classifier.clone(), intents(), None);
        assert!(matches!(second, Err(NluError::TrainingInProgress { .. })));

        let artifact = first.wait().await.unwrap();
        assert_eq!(classifier.current_model_id(), Some(artifact.id));
        assert!(!scheduler.is_training("bot", &Language::english()));

        // Accepted again once the first job finished
        let third = scheduler.submit(classifier, intents(), None).unwrap();
        third.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_keeps_previous_model() {
        let scheduler = TrainingScheduler::new();
        let (classifier, backend) = slow_classifier(Duration::from_secs(30));

        // Install v1 directly, bypassing the slow path
        let set = TrainingSet::from_intents(&intents()).unwrap();
        let bytes = InProcessBackend::default()
            .train(&set, Path::new("."))
            .await
            .unwrap();
        classifier.load_model(&bytes, ModelId::new("v1")).await.unwrap();

        let handle = scheduler
            .submit(classifier.clone(), intents(), Some(ModelId::new("v2")))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(scheduler.cancel("bot", &Language::english()));
        assert!(matches!(handle.wait().await, Err(NluError::TrainingCancelled)));
        assert_eq!(classifier.current_model_id(), Some(ModelId::new("v1")));

        let workdir = backend.workdir.lock().clone().unwrap();
        assert!(!workdir.exists());
    }

    #[tokio::test]
    async fn test_cancel_bot() {
        let scheduler = TrainingScheduler::new();
        let (classifier, _) = slow_classifier(Duration::from_secs(30));

        let handle = scheduler.submit(classifier, intents(), None).unwrap();
        assert_eq!(scheduler.running(), 1);
        assert_eq!(scheduler.cancel_bot("other"), 0);
        assert_eq!(scheduler.cancel_bot("bot"), 1);
        assert_eq!(scheduler.running(), 0);
        assert!(handle.wait().await.is_err());
        assert!(!scheduler.cancel("bot", &Language::english()));
    }
}
