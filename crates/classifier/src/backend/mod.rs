//! Classifier backends
//!
//! A backend turns a training set into an opaque artifact and an artifact
//! into a model that can be queried. Artifacts are plain bytes so they can be
//! stored and shipped by collaborators without knowing the engine.

mod in_process;
mod subprocess;

pub use in_process::InProcessBackend;
pub use subprocess::SubprocessBackend;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use bot_nlu_config::{BackendKind, ClassifierSettings};
use bot_nlu_core::{Prediction, Result};

use crate::training_set::TrainingSet;

/// Statistical engine able to train and load models
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Train a model. `workdir` is a private scratch directory removed by the
    /// caller once training ends or is cancelled.
    async fn train(&self, set: &TrainingSet, workdir: &Path) -> Result<Vec<u8>>;

    /// Load an artifact produced by `train`. The returned model owns every
    /// resource it needs, so it stays usable after a newer model is loaded.
    async fn load(&self, artifact: &[u8]) -> Result<Arc<dyn TrainedModel>>;
}

/// A loaded, immutable model
#[async_trait]
pub trait TrainedModel: Send + Sync {
    /// Up to `k` predictions. An empty result means the engine produced
    /// nothing usable for this text.
    async fn predict(&self, text: &str, k: usize) -> Result<Vec<Prediction>>;
}

/// Backend selected by the settings
pub fn backend_from_settings(settings: &ClassifierSettings) -> Arc<dyn ClassifierBackend> {
    match settings.backend {
        BackendKind::InProcess => Arc::new(InProcessBackend::new(settings.smoothing)),
        BackendKind::Subprocess => Arc::new(SubprocessBackend::from_settings(settings)),
    }
}
